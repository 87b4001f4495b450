use fiscal_core::brackets::TaxBracket;
use fiscal_core::income_tax::orchestrator::{CapitalIncome, CapitalTaxOption, DeclarantIncome};
use fiscal_core::income_tax::{
    apply_quotient_cap, compute_income_tax, compute_parts, resolve_tmi, ChildCustody,
    IncomeTaxInput, RateChangeKind,
};
use fiscal_core::settings::{PsSettings, TaxSettings};
use fiscal_core::{FiscalError, HouseholdStatus, TaxYear};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn household(status: HouseholdStatus, salaries: &[Decimal]) -> IncomeTaxInput {
    IncomeTaxInput {
        year: TaxYear::Current,
        status,
        is_isolated: false,
        children: vec![],
        extra_half_parts: 0,
        location: Default::default(),
        declarants: salaries
            .iter()
            .map(|s| DeclarantIncome {
                salaries: *s,
                ..Default::default()
            })
            .collect(),
        revenus_fonciers: Decimal::ZERO,
        capital: CapitalIncome::default(),
        charges_deductibles: Decimal::ZERO,
        reductions_credits: Decimal::ZERO,
    }
}

fn scale() -> Vec<TaxBracket> {
    TaxSettings::default().income_tax.current.scale
}

// ===========================================================================
// Full household computation
// ===========================================================================

#[test]
fn test_single_salaried_known_answer() {
    let out = compute_income_tax(
        &household(HouseholdStatus::Single, &[dec!(40_000)]),
        &TaxSettings::default(),
        &PsSettings::default(),
    )
    .unwrap();
    let r = &out.result;
    assert_eq!(r.abattement_salaires, dec!(4_000));
    assert_eq!(r.taxable_income, dec!(36_000));
    // 17,818 x 11% + 6,685 x 30%
    assert_eq!(r.ir_net, dec!(3_965.48));
    assert_eq!(r.rfr, dec!(36_000));
    assert_eq!(r.tmi_rate, dec!(30));
    assert_eq!(r.total_tax, r.ir_net);
    assert!(out.warnings.is_empty());
}

#[test]
fn test_couple_two_children_cap_binds() {
    let mut input = household(HouseholdStatus::Couple, &[dec!(60_000), dec!(40_000)]);
    input.children = vec![ChildCustody::Charge, ChildCustody::Charge];
    let out = compute_income_tax(&input, &TaxSettings::default(), &PsSettings::default()).unwrap();
    let r = &out.result;
    assert_eq!(r.parts_nb, dec!(3));
    assert_eq!(r.taxable_income, dec!(90_000));
    assert_eq!(r.ir_before_qf, dec!(13_330.96));
    assert!(r.qf_is_capped);
    // Advantage limited to 2 half parts x 1,791
    assert_eq!(r.ir_after_qf, dec!(9_748.96));
    assert_eq!(r.ir_net, dec!(9_748.96));
    assert!(out.warnings.iter().any(|w| w.contains("capped")));
}

#[test]
fn test_pfu_and_bareme_routing() {
    let mut pfu = household(HouseholdStatus::Single, &[dec!(30_000)]);
    pfu.capital = CapitalIncome {
        dividendes: dec!(10_000),
        ..Default::default()
    };
    let out = compute_income_tax(&pfu, &TaxSettings::default(), &PsSettings::default()).unwrap();
    assert_eq!(out.result.pfu_ir, dec!(1_280));
    assert_eq!(out.result.ps_dividends, dec!(1_720));
    assert_eq!(out.result.rfr, dec!(37_000));

    let mut bareme = pfu.clone();
    bareme.capital.option = CapitalTaxOption::Bareme;
    let out = compute_income_tax(&bareme, &TaxSettings::default(), &PsSettings::default()).unwrap();
    assert_eq!(out.result.pfu_ir, Decimal::ZERO);
    // 27,000 + 6,000 after the 40% abatement - 680 deductible CSG
    assert_eq!(out.result.taxable_income, dec!(32_320));
    assert_eq!(out.result.rfr, dec!(36_320));
}

#[test]
fn test_previous_year_scale_selected() {
    let mut input = household(HouseholdStatus::Single, &[dec!(40_000)]);
    input.year = TaxYear::Previous;
    let out = compute_income_tax(&input, &TaxSettings::default(), &PsSettings::default()).unwrap();
    assert_eq!(out.result.year_label, "Revenus 2023");
    assert!(out.result.ir_net > dec!(3_965.48));
}

#[test]
fn test_three_declarants_rejected() {
    let input = household(
        HouseholdStatus::Couple,
        &[dec!(10_000), dec!(10_000), dec!(10_000)],
    );
    let err = compute_income_tax(&input, &TaxSettings::default(), &PsSettings::default())
        .unwrap_err();
    assert!(matches!(err, FiscalError::InvalidInput { ref field, .. } if field == "declarants"));
}

#[test]
fn test_input_deserializes_with_defaults() {
    let input: IncomeTaxInput = serde_json::from_str(
        r#"{"status": "couple", "children": ["charge", "partagee"],
            "declarants": [{"salaries": "52000"}, {"pensions": 18000}]}"#,
    )
    .unwrap();
    assert_eq!(input.year, TaxYear::Current);
    assert_eq!(input.declarants[1].pensions, dec!(18000));
    let out = compute_income_tax(&input, &TaxSettings::default(), &PsSettings::default()).unwrap();
    assert_eq!(out.result.parts_nb, dec!(2.75));
}

// ===========================================================================
// Marginal rate
// ===========================================================================

#[test]
fn test_tmi_margin_to_next_bracket() {
    let foyer = compute_parts(HouseholdStatus::Single, false, &[], 0);
    let settings = TaxSettings::default();
    let year = &settings.income_tax.current;
    let tmi = resolve_tmi(dec!(25_000), &foyer, &year.scale, &year.quotient_familial);
    assert_eq!(tmi.rate, dec!(11));
    assert_eq!(tmi.change_kind, Some(RateChangeKind::Bracket));
    let margin = tmi.margin_before_change.unwrap();
    assert!((margin - dec!(4_315)).abs() <= dec!(1), "margin {margin}");
    assert_eq!(tmi.base_global, dec!(13_503));
}

#[test]
fn test_zero_income_has_no_tmi() {
    let foyer = compute_parts(HouseholdStatus::Couple, false, &[], 0);
    let settings = TaxSettings::default();
    let year = &settings.income_tax.current;
    let tmi = resolve_tmi(Decimal::ZERO, &foyer, &year.scale, &year.quotient_familial);
    assert_eq!(tmi.rate, Decimal::ZERO);
    assert_eq!(tmi.margin_before_change, None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ir_monotonic_in_income(base in 0i64..400_000, step in 1i64..20_000, kids in 0usize..4) {
        let children = vec![ChildCustody::Charge; kids];
        let foyer = compute_parts(HouseholdStatus::Couple, false, &children, 0);
        let settings = TaxSettings::default();
        let year = &settings.income_tax.current;
        let lo = apply_quotient_cap(Decimal::from(base), &foyer, &year.scale, &year.quotient_familial);
        let hi = apply_quotient_cap(Decimal::from(base + step), &foyer, &year.scale, &year.quotient_familial);
        prop_assert!(hi.ir_after_qf >= lo.ir_after_qf);
        prop_assert!(lo.ir_after_qf <= lo.ir_before_qf);
    }

    #[test]
    fn marginal_rate_belongs_to_scale(income in 1i64..600_000, kids in 0usize..5) {
        let children = vec![ChildCustody::Charge; kids];
        let foyer = compute_parts(HouseholdStatus::Single, true, &children, 0);
        let settings = TaxSettings::default();
        let year = &settings.income_tax.current;
        let tmi = resolve_tmi(Decimal::from(income), &foyer, &year.scale, &year.quotient_familial);
        prop_assert!(tmi.rate >= Decimal::ZERO && tmi.rate <= dec!(45));
        prop_assert!(scale().iter().any(|b| b.rate == tmi.rate));
    }
}
