use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::brackets::{bracket_for, tax_at, TaxBracket};
use crate::error::FiscalError;
use crate::settings::{HeirCategory, TaxSettings};
use crate::types::{pct_to_rate, with_metadata, ComputationOutput, Money, Rate};
use crate::FiscalResult;

/// Share of a DMTG bracket above which a transmission gets a disclaimer.
pub const DMTG_DISCLAIMER_THRESHOLD: Decimal = dec!(0.5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionInput {
    pub capital: Money,
    /// Gain still subject to PS at death.
    #[serde(default)]
    pub gain_soumis_ps: Money,
    pub nb_beneficiaires: u32,
    pub abattement_par_beneficiaire: Money,
    pub dmtg_scale: Vec<TaxBracket>,
    #[serde(default)]
    pub ps_rate: Rate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionResult {
    pub capital_transmis: Money,
    pub abattement: Money,
    pub assiette: Money,
    pub ps_deces: Money,
    pub taxe_forfaitaire: Money,
    pub taxe_dmtg: Money,
    pub capital_transmis_net: Money,
}

/// Article 990 I parameters, rates already converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params990I {
    pub abattement: Money,
    pub taux_1: Rate,
    pub seuil: Money,
    pub taux_2: Rate,
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// PS on the death-triggered gain, then DMTG on the remainder.
///
/// Each beneficiary gets the abatement; the scale is walked on one
/// beneficiary's share and multiplied back by the beneficiary count.
pub fn compute_transmission(input: &TransmissionInput) -> FiscalResult<TransmissionResult> {
    if input.nb_beneficiaires == 0 {
        return Err(FiscalError::InvalidInput {
            field: "nb_beneficiaires".into(),
            reason: "At least one beneficiary is required".into(),
        });
    }
    let n = Decimal::from(input.nb_beneficiaires);
    let capital = input.capital.max(Decimal::ZERO);

    let ps_deces = input.gain_soumis_ps.max(Decimal::ZERO).min(capital) * input.ps_rate;
    let after_ps = capital - ps_deces;

    let abattement_total = input.abattement_par_beneficiaire.max(Decimal::ZERO) * n;
    let abattement = abattement_total.min(after_ps);
    let assiette = after_ps - abattement;

    let taxe_dmtg = tax_at(&input.dmtg_scale, assiette / n) * n;

    Ok(TransmissionResult {
        capital_transmis: capital,
        abattement,
        assiette,
        ps_deces,
        taxe_forfaitaire: Decimal::ZERO,
        taxe_dmtg,
        capital_transmis_net: capital - ps_deces - taxe_dmtg,
    })
}

/// Flat 990 I levy on one beneficiary's death benefit: the first rate up to
/// the threshold, the second above, after the abatement.
pub fn compute_990i(capital_per_beneficiary: Money, params: &Params990I) -> Money {
    let taxable = (capital_per_beneficiary - params.abattement).max(Decimal::ZERO);
    let first = taxable.min(params.seuil);
    let second = (taxable - params.seuil).max(Decimal::ZERO);
    first * params.taux_1 + second * params.taux_2
}

/// Share of the bracket width consumed by the taxable base. Zero whenever
/// either argument is not positive.
pub fn compute_dmtg_consumption_ratio(assiette: Money, tranche_width: Money) -> Decimal {
    if assiette <= Decimal::ZERO || tranche_width <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    assiette / tranche_width
}

pub fn should_show_dmtg_disclaimer(assiette: Money, tranche_width: Money, threshold: Decimal) -> bool {
    compute_dmtg_consumption_ratio(assiette, tranche_width) > threshold
}

/// Width of the DMTG bracket a per-beneficiary base falls in; `None` in the
/// open top bracket.
pub fn tranche_width_for(scale: &[TaxBracket], base_per_beneficiary: Money) -> Option<Money> {
    bracket_for(scale, base_per_beneficiary).and_then(TaxBracket::width)
}

// ---------------------------------------------------------------------------
// Succession entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessionInput {
    pub capital: Money,
    #[serde(default)]
    pub gain_soumis_ps: Money,
    pub nb_beneficiaires: u32,
    #[serde(default)]
    pub heir: HeirCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessionOutput {
    pub heir: HeirCategory,
    pub transmission: TransmissionResult,
    pub part_par_beneficiaire: Money,
    pub tranche_width: Option<Money>,
    pub consumption_ratio: Decimal,
    pub show_dmtg_disclaimer: bool,
    pub taux_effectif: Rate,
}

/// DMTG for a plain estate transmission to `nb_beneficiaires` heirs of one
/// category, using the settings' abatement and scale.
pub fn compute_succession(
    input: &SuccessionInput,
    tax: &TaxSettings,
    ps_rate_pct: Decimal,
) -> FiscalResult<ComputationOutput<SuccessionOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let category = tax.dmtg.category(input.heir);
    let transmission = compute_transmission(&TransmissionInput {
        capital: input.capital,
        gain_soumis_ps: input.gain_soumis_ps,
        nb_beneficiaires: input.nb_beneficiaires,
        abattement_par_beneficiaire: category.abattement,
        dmtg_scale: category.scale.clone(),
        ps_rate: pct_to_rate(ps_rate_pct),
    })?;

    let n = Decimal::from(input.nb_beneficiaires);
    let part = transmission.assiette / n;
    let tranche_width = tranche_width_for(&category.scale, part);
    let consumption_ratio =
        compute_dmtg_consumption_ratio(part, tranche_width.unwrap_or(Decimal::ZERO));
    let show_dmtg_disclaimer =
        should_show_dmtg_disclaimer(part, tranche_width.unwrap_or(Decimal::ZERO), DMTG_DISCLAIMER_THRESHOLD);
    if show_dmtg_disclaimer {
        warnings.push(format!(
            "Each share consumes {}% of its DMTG bracket; marginal duty is sensitive to the estate value.",
            (consumption_ratio * Decimal::ONE_HUNDRED).round_dp(0)
        ));
    }
    if input.heir == HeirCategory::Conjoint {
        warnings.push("Surviving spouse or PACS partner: exempt from DMTG.".into());
    }

    let taux_effectif = if transmission.capital_transmis > Decimal::ZERO {
        (transmission.ps_deces + transmission.taxe_dmtg) / transmission.capital_transmis
    } else {
        Decimal::ZERO
    };

    let output = SuccessionOutput {
        heir: input.heir,
        transmission,
        part_par_beneficiaire: part,
        tranche_width,
        consumption_ratio,
        show_dmtg_disclaimer,
        taux_effectif,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DMTG: PS on death-triggered gain, per-beneficiary abatement, bracket walk per share",
        &serde_json::json!({
            "heir": input.heir,
            "abattement_par_beneficiaire": category.abattement.to_string(),
            "nb_beneficiaires": input.nb_beneficiaires,
        }),
        warnings,
        elapsed,
        output,
    ))
}
