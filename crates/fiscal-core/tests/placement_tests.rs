use fiscal_core::placement::types::*;
use fiscal_core::placement::{
    normalize_versement_config, simulate_comparison, simulate_complete, ComparisonInput,
};
use fiscal_core::rules::FiscalParams;
use fiscal_core::settings::HeirCategory;
use fiscal_core::HouseholdStatus;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn client() -> ClientProfile {
    ClientProfile {
        age_actuel: 40,
        status: HouseholdStatus::Couple,
        tmi_epargne: dec!(0.41),
        tmi_retraite: dec!(0.30),
    }
}

fn product(envelope: Envelope, initial: Decimal, annuel: Decimal) -> ProductConfig {
    ProductConfig {
        envelope,
        label: String::new(),
        duree_epargne: 20,
        anciennete: 0,
        versements: VersementConfig {
            initial: Versement {
                montant: initial,
                ..Default::default()
            },
            annuel: Versement {
                montant: annuel,
                ..Default::default()
            },
            ponctuels: vec![],
            capitalisation: CapitalisationConfig {
                rendement_annuel: dec!(0.035),
            },
            distribution: DistributionConfig {
                rendement_annuel: dec!(0.01),
                taux_distribution: dec!(0.045),
                strategie: DistributionStrategy::Apprehender,
            },
        },
        ordre_retrait: WithdrawalOrdering::Prorata,
    }
}

fn simulation(envelope: Envelope) -> SimulationInput {
    SimulationInput {
        product: product(envelope, dec!(20_000), dec!(3_000)),
        client: client(),
        liquidation: LiquidationParams::default(),
        transmission: TransmissionParams {
            age_deces: 88,
            nb_beneficiaires: 2,
            heir: HeirCategory::LigneDirecte,
        },
    }
}

#[test]
fn test_timeline_covers_horizon() {
    let out = simulate_complete(&simulation(Envelope::AssuranceVie), &FiscalParams::default()).unwrap();
    let r = &out.result;
    assert_eq!(r.epargne.len(), 20);
    assert_eq!(r.liquidation.len(), 28);
    assert_eq!(r.epargne[0].age, 40);
    assert_eq!(r.liquidation[0].annee, 21);
    assert_eq!(r.liquidation[0].age, 60);
    assert_eq!(r.label, "assuranceVie");
}

#[test]
fn test_capital_is_continuous_between_phases() {
    let r = simulate_complete(&simulation(Envelope::Cto), &FiscalParams::default())
        .unwrap()
        .result;
    assert_eq!(r.liquidation[0].capital_debut, r.totaux.capital_fin_epargne);
    for pair in r.liquidation.windows(2) {
        assert_eq!(pair[1].capital_debut, pair[0].capital_fin);
    }
}

#[test]
fn test_net_withdrawal_identity() {
    let r = simulate_complete(&simulation(Envelope::Per), &FiscalParams::default())
        .unwrap()
        .result;
    for row in &r.liquidation {
        assert_eq!(row.retrait_net, row.retrait_brut - row.impot_revenu - row.prelevements_sociaux);
        assert_eq!(row.retrait_brut, row.part_capital + row.part_gains);
    }
    assert!(r.totaux.economie_impot > Decimal::ZERO);
}

#[test]
fn test_scpi_forced_to_distribution() {
    let mut input = simulation(Envelope::Scpi);
    input.product.versements.annuel.pct_capitalisation = dec!(70);
    input.product.versements.annuel.pct_distribution = dec!(30);
    let out = simulate_complete(&input, &FiscalParams::default()).unwrap();
    assert!(out.result.epargne.iter().all(|row| row.capital_capitalisation == Decimal::ZERO));
    assert!(out.warnings.iter().any(|w| w.contains("SCPI")));
}

#[test]
fn test_late_premiums_fall_under_757b() {
    let mut input = simulation(Envelope::AssuranceVie);
    input.client.age_actuel = 65;
    input.product.duree_epargne = 10;
    input.liquidation.strategie = LiquidationStrategy::Mensualite;
    input.liquidation.mensualite_cible = Decimal::ZERO;
    input.transmission.age_deces = 80;
    let r = simulate_complete(&input, &FiscalParams::default()).unwrap().result;
    let t = &r.transmission;
    assert!(t.primes_757b > Decimal::ZERO);
    assert!(t.capital_990i > Decimal::ZERO);
    assert!(t.capital_990i + t.primes_757b <= t.result.capital_transmis);
}

#[test]
fn test_comparison_runs_both_products() {
    let input = ComparisonInput {
        client: client(),
        liquidation: LiquidationParams::default(),
        transmission: TransmissionParams {
            age_deces: 88,
            nb_beneficiaires: 2,
            heir: HeirCategory::LigneDirecte,
        },
        product_a: product(Envelope::Cto, dec!(20_000), dec!(3_000)),
        product_b: product(Envelope::Pea, dec!(20_000), dec!(3_000)),
    };
    let out = simulate_comparison(&input, &FiscalParams::default()).unwrap();
    let c = &out.result.comparison;
    assert_eq!(c.summary_a.label, "cto");
    assert_eq!(c.summary_b.label, "pea");
    assert_eq!(
        c.deltas.gain_net,
        c.summary_b.gain_net - c.summary_a.gain_net
    );
    assert_eq!(c.meilleur.as_deref(), Some("pea"));
}

#[test]
fn test_input_from_json() {
    let input: SimulationInput = serde_json::from_str(
        r#"{
            "product": {"envelope": "av", "duree_epargne": 8,
                        "versements": {"initial": {"montant": 10000},
                                       "capitalisation": {"rendement_annuel": "0.02"}}},
            "client": {"age_actuel": 50},
            "transmission": {"age_deces": 70, "nb_beneficiaires": 1}
        }"#,
    )
    .unwrap();
    assert_eq!(input.product.envelope, Envelope::AssuranceVie);
    assert_eq!(input.liquidation.duree_retraits, 20);
    let r = simulate_complete(&input, &FiscalParams::default()).unwrap().result;
    // Both allocations absent: everything goes to capitalisation.
    assert_eq!(r.epargne[0].capital_capitalisation, dec!(10_200));
}

fn envelope_strategy() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        Just(Envelope::AssuranceVie),
        Just(Envelope::Per),
        Just(Envelope::Cto),
        Just(Envelope::Pea),
        Just(Envelope::Scpi),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn allocation_always_sums_to_hundred(
        envelope in envelope_strategy(),
        capi in 0i64..300,
        dist in 0i64..300,
        fee in -50i64..150,
    ) {
        let mut cfg = VersementConfig::default();
        cfg.initial = Versement {
            montant: dec!(1_000),
            frais_entree: Decimal::new(fee, 2),
            pct_capitalisation: Decimal::from(capi),
            pct_distribution: Decimal::from(dist),
            annee: None,
        };
        let out = normalize_versement_config(&cfg, envelope);
        prop_assert_eq!(out.initial.pct_capitalisation + out.initial.pct_distribution, dec!(100));
        prop_assert!(out.initial.frais_entree >= Decimal::ZERO && out.initial.frais_entree <= Decimal::ONE);
        if envelope == Envelope::Scpi {
            prop_assert_eq!(out.initial.pct_capitalisation, Decimal::ZERO);
        }
    }

    #[test]
    fn simulation_is_deterministic(envelope in envelope_strategy(), initial in 0i64..200_000) {
        let mut input = simulation(envelope);
        input.product.versements.initial.montant = Decimal::from(initial);
        let params = FiscalParams::default();
        let a = simulate_complete(&input, &params).unwrap().result;
        let b = simulate_complete(&input, &params).unwrap().result;
        prop_assert_eq!(a, b);
    }
}
