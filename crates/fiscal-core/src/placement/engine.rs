use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Instant;
use tracing::debug;

use crate::rules::resolver::FiscalParams;
use crate::sanitize::{
    clamp_age, clamp_duration, clamp_percent, clamp_unit_rate, clamp_with_warning, non_negative,
};
use crate::settings::HeirCategory;
use crate::succession::dmtg::{
    compute_990i, compute_dmtg_consumption_ratio, compute_transmission, tranche_width_for,
    Params990I, TransmissionInput, TransmissionResult, DMTG_DISCLAIMER_THRESHOLD,
};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::FiscalResult;

use super::envelope::{
    av_annual_abatement, distribution_tax, split_withdrawal, withdrawal_tax, ExitContext,
};
use super::types::*;

const MONTHS_PER_YEAR: Decimal = dec!(12);

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_versement(v: &Versement, envelope: Envelope) -> Versement {
    let (pct_capitalisation, pct_distribution) = if envelope == Envelope::Scpi {
        (Decimal::ZERO, Decimal::ONE_HUNDRED)
    } else {
        let capi = clamp_percent(v.pct_capitalisation);
        let dist = clamp_percent(v.pct_distribution);
        let sum = capi + dist;
        if sum.is_zero() {
            (Decimal::ONE_HUNDRED, Decimal::ZERO)
        } else {
            let capi = capi * Decimal::ONE_HUNDRED / sum;
            (capi, Decimal::ONE_HUNDRED - capi)
        }
    };
    Versement {
        montant: non_negative(v.montant),
        frais_entree: clamp_unit_rate(v.frais_entree),
        pct_capitalisation,
        pct_distribution,
        annee: v.annee,
    }
}

/// Bring a payment schedule in line with the envelope: SCPI shares are
/// distribution-only, fees lie in [0, 1], allocations sum to 100.
pub fn normalize_versement_config(config: &VersementConfig, envelope: Envelope) -> VersementConfig {
    VersementConfig {
        initial: normalize_versement(&config.initial, envelope),
        annuel: normalize_versement(&config.annuel, envelope),
        ponctuels: config
            .ponctuels
            .iter()
            .map(|v| normalize_versement(v, envelope))
            .collect(),
        capitalisation: config.capitalisation.clone(),
        distribution: config.distribution.clone(),
    }
}

impl SimulationInput {
    /// Copy with ages and durations clamped to their valid ranges.
    pub fn sanitized(&self) -> (SimulationInput, Vec<String>) {
        let mut warnings = Vec::new();
        let mut out = self.clone();
        out.client.age_actuel =
            clamp_with_warning("age_actuel", out.client.age_actuel, clamp_age, &mut warnings);
        out.transmission.age_deces =
            clamp_with_warning("age_deces", out.transmission.age_deces, clamp_age, &mut warnings);
        out.product.duree_epargne = clamp_with_warning(
            "duree_epargne",
            out.product.duree_epargne,
            clamp_duration,
            &mut warnings,
        );
        out.liquidation.duree_retraits = clamp_with_warning(
            "duree_retraits",
            out.liquidation.duree_retraits,
            clamp_duration,
            &mut warnings,
        );
        (out, warnings)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PocketState {
    capi: Money,
    distrib: Money,
    stock: Money,
    /// Untaxed principal.
    basis: Money,
    primes_avant_limite: Money,
    primes_apres_limite: Money,
}

impl PocketState {
    fn total(&self) -> Money {
        self.capi + self.distrib + self.stock
    }

    fn gain(&self) -> Money {
        (self.total() - self.basis).max(Decimal::ZERO)
    }

    /// Take `amount` from the stock first, then pro-rata from the pockets.
    fn draw(&mut self, amount: Money) {
        let from_stock = amount.min(self.stock);
        self.stock -= from_stock;
        let rest = amount - from_stock;
        let pockets = self.capi + self.distrib;
        if rest <= Decimal::ZERO || pockets <= Decimal::ZERO {
            return;
        }
        let from_capi = rest * self.capi / pockets;
        self.capi = (self.capi - from_capi).max(Decimal::ZERO);
        self.distrib = (self.distrib - (rest - from_capi)).max(Decimal::ZERO);
    }

    /// Remove withdrawn principal, shrinking both premium buckets in proportion.
    fn release_principal(&mut self, principal: Money) {
        if self.basis <= Decimal::ZERO || principal <= Decimal::ZERO {
            return;
        }
        let kept = Decimal::ONE - (principal / self.basis).min(Decimal::ONE);
        self.primes_avant_limite *= kept;
        self.primes_apres_limite *= kept;
        self.basis = (self.basis - principal).max(Decimal::ZERO);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct YearIncome {
    gains_capitalisation: Money,
    revalorisation: Money,
    distributions_brutes: Money,
    fiscalite: Money,
    percues: Money,
}

struct Simulator<'a> {
    input: &'a SimulationInput,
    versements: VersementConfig,
    params: &'a FiscalParams,
    state: PocketState,
}

impl<'a> Simulator<'a> {
    fn envelope(&self) -> Envelope {
        self.input.product.envelope
    }

    /// One year of pocket growth and distribution handling.
    fn grow_one_year(&mut self, tmi: Rate) -> YearIncome {
        let cfg = &self.versements;
        let envelope = self.input.product.envelope;
        let s = &mut self.state;

        let gains_capitalisation = s.capi * cfg.capitalisation.rendement_annuel;
        s.capi += gains_capitalisation;

        let distributions_brutes = s.distrib * cfg.distribution.taux_distribution;
        let revalorisation = s.distrib * cfg.distribution.rendement_annuel;
        s.distrib += revalorisation;

        let fiscalite = distribution_tax(
            envelope,
            distributions_brutes,
            tmi,
            self.input.liquidation.option_bareme,
            self.params,
        );
        let net = distributions_brutes - fiscalite;
        // Income already taxed outside a wrapper becomes principal.
        let taxed_basis = if envelope.is_wrapper() { Decimal::ZERO } else { net };

        let mut percues = Decimal::ZERO;
        match cfg.distribution.strategie {
            DistributionStrategy::Stocker => {
                s.stock += net;
                s.basis += taxed_basis;
            }
            DistributionStrategy::ReinvestirCapi => {
                s.capi += net;
                s.basis += taxed_basis;
            }
            DistributionStrategy::Apprehender => percues = net,
        }

        YearIncome {
            gains_capitalisation,
            revalorisation,
            distributions_brutes,
            fiscalite,
            percues,
        }
    }

    /// Yield the capital is expected to earn while being drawn down.
    fn blended_growth_rate(&self) -> Rate {
        let s = &self.state;
        let total = s.total();
        if total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let cfg = &self.versements;
        let retained = match cfg.distribution.strategie {
            DistributionStrategy::Apprehender => Decimal::ZERO,
            _ => cfg.distribution.taux_distribution,
        };
        (s.capi * cfg.capitalisation.rendement_annuel
            + s.distrib * (cfg.distribution.rendement_annuel + retained))
            / total
    }

    fn pay(&mut self, v: &Versement, age: u32) -> (Money, Money, Money) {
        let frais = v.montant * v.frais_entree;
        let net = v.montant - frais;
        let s = &mut self.state;
        s.capi += net * v.pct_capitalisation / Decimal::ONE_HUNDRED;
        s.distrib += net * v.pct_distribution / Decimal::ONE_HUNDRED;
        s.basis += net;
        if age < self.params.av_age_limite_primes {
            s.primes_avant_limite += net;
        } else {
            s.primes_apres_limite += net;
        }
        (v.montant, frais, net)
    }

    fn constitution_year(&mut self, annee: u32, age: u32) -> EpargneRow {
        let capital_debut = self.state.total();

        let mut payments: Vec<Versement> = Vec::new();
        if annee == 1 {
            payments.push(self.versements.initial.clone());
        }
        payments.push(self.versements.annuel.clone());
        payments.extend(
            self.versements
                .ponctuels
                .iter()
                .filter(|p| p.annee == Some(annee))
                .cloned(),
        );

        let (mut brut, mut frais, mut net) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        for v in &payments {
            let (b, f, n) = self.pay(v, age);
            brut += b;
            frais += f;
            net += n;
        }
        let economie_impot = if self.envelope() == Envelope::Per {
            brut * self.input.client.tmi_epargne
        } else {
            Decimal::ZERO
        };

        let income = self.grow_one_year(self.input.client.tmi_epargne);
        let s = &self.state;
        EpargneRow {
            annee,
            age,
            capital_debut,
            versement_brut: brut,
            frais,
            versement_net: net,
            gains_capitalisation: income.gains_capitalisation,
            revalorisation_distribution: income.revalorisation,
            distributions_brutes: income.distributions_brutes,
            fiscalite_distributions: income.fiscalite,
            distributions_percues: income.percues,
            capital_capitalisation: s.capi,
            capital_distribution: s.distrib,
            stock: s.stock,
            capital_fin: s.total(),
            capital_non_impose: s.basis,
            economie_impot,
        }
    }

    fn target_withdrawal(&self, k: u32) -> Money {
        let liq = &self.input.liquidation;
        let value = self.state.total();
        match liq.strategie {
            LiquidationStrategy::Epuiser if k <= liq.duree_retraits => {
                annuity_due_withdrawal(value, self.blended_growth_rate(), liq.duree_retraits - k + 1)
            }
            LiquidationStrategy::Epuiser => Decimal::ZERO,
            LiquidationStrategy::Mensualite => liq.mensualite_cible * MONTHS_PER_YEAR,
            LiquidationStrategy::Unique if k == 1 => value,
            LiquidationStrategy::Unique => Decimal::ZERO,
        }
    }

    fn liquidation_year(&mut self, k: u32, annee: u32, age: u32, years_held: u32) -> LiquidationRow {
        let value = self.state.total();
        let retrait_brut = self.target_withdrawal(k).min(value).max(Decimal::ZERO);
        let split = split_withdrawal(
            retrait_brut,
            value,
            self.state.basis,
            self.input.product.ordre_retrait,
        );
        let ctx = ExitContext {
            envelope: self.envelope(),
            years_held,
            status: self.input.client.status,
            tmi: self.input.client.tmi_retraite,
            option_bareme: self.input.liquidation.option_bareme,
            premiums_outstanding: self.state.basis,
            params: self.params,
        };
        let tax = withdrawal_tax(
            &ctx,
            split,
            av_annual_abatement(self.input.client.status, self.params),
        );

        self.state.draw(retrait_brut);
        self.state.release_principal(split.principal);

        let income = self.grow_one_year(self.input.client.tmi_retraite);
        let s = &self.state;
        LiquidationRow {
            annee,
            age,
            capital_debut: value,
            retrait_brut,
            part_capital: split.principal,
            part_gains: split.gain,
            impot_revenu: tax.ir,
            prelevements_sociaux: tax.ps,
            retrait_net: retrait_brut - tax.ir - tax.ps,
            distributions_brutes: income.distributions_brutes,
            fiscalite_distributions: income.fiscalite,
            distributions_percues: income.percues,
            capital_fin: s.total(),
            capital_non_impose: s.basis,
            gains_latents: s.gain(),
        }
    }

    fn transmission(&self, nb_beneficiaires: u32) -> FiscalResult<PlacementTransmission> {
        let tp = &self.input.transmission;
        let p = self.params;
        let category = p.dmtg.category(tp.heir);
        let value = self.state.total();
        let gain = self.state.gain();
        let n = Decimal::from(nb_beneficiaires);

        let (result, capital_990i, primes_757b, dmtg_assiette) = match self.envelope() {
            Envelope::AssuranceVie | Envelope::Per => {
                let ps_deces = gain * p.ps_rate;
                let after_ps = value - ps_deces;
                let s = &self.state;
                let primes = s.primes_avant_limite + s.primes_apres_limite;
                let share_990i = if primes > Decimal::ZERO {
                    s.primes_avant_limite / primes
                } else {
                    Decimal::ONE
                };
                let capital_990i = after_ps * share_990i;
                let primes_757b = s.primes_apres_limite.min(after_ps - capital_990i);

                if tp.heir == HeirCategory::Conjoint {
                    let result = TransmissionResult {
                        capital_transmis: value,
                        ps_deces,
                        capital_transmis_net: after_ps,
                        ..Default::default()
                    };
                    (result, capital_990i, primes_757b, Decimal::ZERO)
                } else {
                    let params_990i = Params990I {
                        abattement: p.av_990i_abattement,
                        taux_1: p.av_990i_taux_1,
                        seuil: p.av_990i_seuil,
                        taux_2: p.av_990i_taux_2,
                    };
                    let taxe_forfaitaire = compute_990i(capital_990i / n, &params_990i) * n;
                    let abattement_990i = (p.av_990i_abattement * n).min(capital_990i);

                    let abattement_757b = p.av_757b_abattement.min(primes_757b);
                    let dmtg = compute_transmission(&TransmissionInput {
                        capital: primes_757b - abattement_757b,
                        gain_soumis_ps: Decimal::ZERO,
                        nb_beneficiaires,
                        abattement_par_beneficiaire: category.abattement,
                        dmtg_scale: category.scale.clone(),
                        ps_rate: Decimal::ZERO,
                    })?;

                    let result = TransmissionResult {
                        capital_transmis: value,
                        abattement: abattement_990i + abattement_757b + dmtg.abattement,
                        assiette: (capital_990i - abattement_990i) + dmtg.assiette,
                        ps_deces,
                        taxe_forfaitaire,
                        taxe_dmtg: dmtg.taxe_dmtg,
                        capital_transmis_net: value - ps_deces - taxe_forfaitaire - dmtg.taxe_dmtg,
                    };
                    (result, capital_990i, primes_757b, dmtg.assiette)
                }
            }
            Envelope::Cto | Envelope::Scpi | Envelope::Pea => {
                // Latent gains on securities and property are purged at death;
                // a PEA closes and bears PS on its gain.
                let gain_soumis_ps = if self.envelope() == Envelope::Pea {
                    gain
                } else {
                    Decimal::ZERO
                };
                let result = compute_transmission(&TransmissionInput {
                    capital: value,
                    gain_soumis_ps,
                    nb_beneficiaires,
                    abattement_par_beneficiaire: category.abattement,
                    dmtg_scale: category.scale.clone(),
                    ps_rate: p.ps_rate,
                })?;
                let assiette = result.assiette;
                (result, Decimal::ZERO, Decimal::ZERO, assiette)
            }
        };

        let part = dmtg_assiette / n;
        let width = tranche_width_for(&category.scale, part).unwrap_or(Decimal::ZERO);
        let consumption_ratio = compute_dmtg_consumption_ratio(part, width);

        Ok(PlacementTransmission {
            age_deces: tp.age_deces,
            heir: tp.heir,
            capital_990i,
            primes_757b,
            result,
            consumption_ratio,
            show_dmtg_disclaimer: consumption_ratio > DMTG_DISCLAIMER_THRESHOLD,
        })
    }
}

/// Level withdrawal, taken at the start of each year before growth, that
/// exhausts `value` in `years` at `rate`.
pub fn annuity_due_withdrawal(value: Money, rate: Rate, years: u32) -> Money {
    if value <= Decimal::ZERO || years == 0 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(years);
    let growth = Decimal::ONE + rate;
    if years == 1 || rate.is_zero() || growth <= Decimal::ZERO {
        return value / n;
    }
    let mut discount = Decimal::ONE;
    for _ in 0..years {
        discount /= growth;
    }
    let denominator = (Decimal::ONE - discount) * growth;
    if denominator.is_zero() {
        return value / n;
    }
    value * rate / denominator
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one product through constitution, liquidation and transmission.
pub fn run_simulation(
    input: &SimulationInput,
    params: &FiscalParams,
) -> FiscalResult<(SimulationResult, Vec<String>)> {
    let mut warnings: Vec<String> = Vec::new();
    let product = &input.product;

    let versements = normalize_versement_config(&product.versements, product.envelope);
    if product.envelope == Envelope::Scpi && versements != product.versements {
        warnings.push("SCPI payments forced to 100% distribution.".into());
    }

    let nb_beneficiaires = if input.transmission.nb_beneficiaires == 0 {
        warnings.push("No beneficiary given; one assumed.".into());
        1
    } else {
        input.transmission.nb_beneficiaires
    };

    let age_start = input.client.age_actuel;
    let horizon = input.transmission.age_deces.saturating_sub(age_start);
    if horizon == 0 {
        warnings.push("Age at death is not after the current age; nothing is simulated.".into());
    }
    let savings_years = product.duree_epargne.min(horizon);
    let liquidation_years = horizon - savings_years;

    let mut sim = Simulator {
        input,
        versements,
        params,
        state: PocketState::default(),
    };

    let mut epargne = Vec::with_capacity(savings_years as usize);
    for annee in 1..=savings_years {
        epargne.push(sim.constitution_year(annee, age_start + annee - 1));
    }
    let capital_fin_epargne = sim.state.total();

    let mut liquidation = Vec::with_capacity(liquidation_years as usize);
    for k in 1..=liquidation_years {
        let annee = savings_years + k;
        let years_held = product.anciennete + annee - 1;
        liquidation.push(sim.liquidation_year(k, annee, age_start + annee - 1, years_held));
    }

    let transmission = sim.transmission(nb_beneficiaires)?;
    if transmission.show_dmtg_disclaimer {
        warnings.push(format!(
            "Transmission consumes {}% of its DMTG bracket.",
            (transmission.consumption_ratio * Decimal::ONE_HUNDRED).round_dp(0)
        ));
    }

    let totaux = compute_totals(&epargne, &liquidation, capital_fin_epargne, &transmission);

    debug!(
        envelope = ?product.envelope,
        savings_years,
        liquidation_years,
        capital_fin_epargne = %capital_fin_epargne,
        roi = %totaux.roi,
        "placement simulated"
    );

    let label = if product.label.is_empty() {
        product.envelope.product_id().to_string()
    } else {
        product.label.clone()
    };

    Ok((
        SimulationResult {
            label,
            envelope: product.envelope,
            epargne,
            liquidation,
            transmission,
            totaux,
        },
        warnings,
    ))
}

fn compute_totals(
    epargne: &[EpargneRow],
    liquidation: &[LiquidationRow],
    capital_fin_epargne: Money,
    transmission: &PlacementTransmission,
) -> SimulationTotals {
    let mut t = SimulationTotals {
        capital_fin_epargne,
        capital_transmis_net: transmission.result.capital_transmis_net,
        ..Default::default()
    };
    for row in epargne {
        t.total_verse += row.versement_brut;
        t.total_frais += row.frais;
        t.economie_impot += row.economie_impot;
        t.distributions_percues += row.distributions_percues;
        t.fiscalite_distributions += row.fiscalite_distributions;
    }
    for row in liquidation {
        t.total_retraits_bruts += row.retrait_brut;
        t.total_retraits_nets += row.retrait_net;
        t.impot_retraits += row.impot_revenu;
        t.ps_retraits += row.prelevements_sociaux;
        t.distributions_percues += row.distributions_percues;
        t.fiscalite_distributions += row.fiscalite_distributions;
    }
    t.gain_net = t.total_retraits_nets + t.distributions_percues + t.capital_transmis_net
        + t.economie_impot
        - t.total_verse;
    t.roi = if t.total_verse > Decimal::ZERO {
        t.gain_net / t.total_verse
    } else {
        Decimal::ZERO
    };
    t
}

/// Simulate one product and wrap the result with metadata.
pub fn simulate_complete(
    input: &SimulationInput,
    params: &FiscalParams,
) -> FiscalResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let (result, warnings) = run_simulation(input, params)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Year-by-year envelope simulation: constitution, liquidation, transmission",
        &serde_json::json!({
            "envelope": input.product.envelope,
            "liquidation": input.liquidation.strategie,
            "ordre_retrait": input.product.ordre_retrait,
            "option_bareme": input.liquidation.option_bareme,
            "heir": input.transmission.heir,
        }),
        warnings,
        elapsed,
        result,
    ))
}
