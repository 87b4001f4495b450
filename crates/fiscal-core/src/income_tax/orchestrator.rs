use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::brackets::{bracket_breakdown, BracketSlice};
use crate::error::FiscalError;
use crate::settings::{AbatementBounds, IncomeTaxYear, PsSettings, TaxSettings};
use crate::types::{pct_to_rate, with_metadata, ComputationOutput, HouseholdStatus, Money, Percent, TaxYear};
use crate::FiscalResult;

use super::marginal::{CappedTax, RateChangeKind};
use super::quotient::{apply_quotient_cap, compute_parts, ChildCustody, FoyerDescription};
use super::social::{compute_pension_ps, compute_social_contributions, SocialContributionsInput};
use super::surtax::{compute_cdhr, compute_cehr, CdhrInput};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where the household is domiciled, for the overseas IR rebate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    #[default]
    Metropole,
    /// Guadeloupe, Martinique, La Réunion.
    Gmr,
    /// Guyane, Mayotte.
    Guyane,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapitalTaxOption {
    #[default]
    Pfu,
    Bareme,
}

/// Income of one declarant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarantIncome {
    #[serde(default)]
    pub salaries: Money,
    /// Actual professional expenses, replacing the 10% abatement when set.
    #[serde(default)]
    pub frais_reels: Option<Money>,
    #[serde(default)]
    pub pensions: Money,
    /// Net self-employment income (BIC / BNC / BA).
    #[serde(default)]
    pub independant: Money,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapitalIncome {
    #[serde(default)]
    pub dividendes: Money,
    #[serde(default)]
    pub interets: Money,
    #[serde(default)]
    pub plus_values: Money,
    #[serde(default)]
    pub option: CapitalTaxOption,
}

impl CapitalIncome {
    pub fn total(&self) -> Money {
        self.dividendes + self.interets + self.plus_values
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeTaxInput {
    #[serde(default)]
    pub year: TaxYear,
    pub status: HouseholdStatus,
    #[serde(default)]
    pub is_isolated: bool,
    #[serde(default)]
    pub children: Vec<ChildCustody>,
    /// Invalidity, veteran and similar half parts.
    #[serde(default)]
    pub extra_half_parts: u32,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub declarants: Vec<DeclarantIncome>,
    /// Net property income (a deficit is not imputed on the global income).
    #[serde(default)]
    pub revenus_fonciers: Money,
    #[serde(default)]
    pub capital: CapitalIncome,
    #[serde(default)]
    pub charges_deductibles: Money,
    #[serde(default)]
    pub reductions_credits: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeTaxOutput {
    pub year_label: String,
    pub abattement_salaires: Money,
    pub abattement_pensions: Money,
    pub revenu_brut_global: Money,
    pub csg_deductible: Money,
    pub taxable_income: Money,
    pub foyer: FoyerDescription,
    pub parts_nb: Decimal,
    pub ir_before_qf: Money,
    pub qf_advantage: Money,
    pub qf_is_capped: bool,
    pub ir_after_qf: Money,
    pub dom_abatement: Money,
    pub decote: Money,
    pub reductions: Money,
    pub ir_net: Money,
    pub pfu_ir: Money,
    pub rfr: Money,
    pub cehr: Money,
    pub cdhr: Money,
    pub ps_foncier: Money,
    pub ps_dividends: Money,
    pub ps_total: Money,
    pub ps_pensions: Money,
    pub total_tax: Money,
    pub tmi_rate: Percent,
    pub tmi_base_global: Money,
    pub tmi_margin_global: Option<Money>,
    pub tmi_change_kind: Option<RateChangeKind>,
    pub brackets_detail: Vec<BracketSlice>,
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Compute the household's income tax, surtaxes and social contributions.
///
/// The progressive scale is applied through the capped quotient familial,
/// then the overseas rebate, the décote and the tax reductions. Capital
/// income goes either to the flat PFU or to the scale. The marginal rate and
/// the margin before its next change are read off the capped tax function.
pub fn compute_income_tax(
    input: &IncomeTaxInput,
    tax_settings: &TaxSettings,
    ps_settings: &PsSettings,
) -> FiscalResult<ComputationOutput<IncomeTaxOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input, &mut warnings)?;

    let year = tax_settings.income_tax.get(input.year);
    let pfu = tax_settings.pfu.get(input.year);
    let patrimony = ps_settings.patrimony.get(input.year);

    // ------------------------------------------------------------------
    // 1. Categorical incomes and 10% abatements
    // ------------------------------------------------------------------
    let mut abattement_salaires = Decimal::ZERO;
    let mut salaries_net = Decimal::ZERO;
    let mut pensions_gross = Decimal::ZERO;
    let mut abattement_pensions_raw = Decimal::ZERO;
    let mut independant = Decimal::ZERO;

    for declarant in &input.declarants {
        let deduction = match declarant.frais_reels {
            Some(frais) => frais.max(Decimal::ZERO).min(declarant.salaries),
            None => ten_percent(declarant.salaries, &year.abat10.salaries),
        };
        abattement_salaires += deduction;
        salaries_net += declarant.salaries - deduction;

        pensions_gross += declarant.pensions;
        abattement_pensions_raw += ten_percent(declarant.pensions, &year.abat10.retirees);
        independant += declarant.independant;
    }
    // The pension cap applies to the household, not per pensioner.
    let abattement_pensions = abattement_pensions_raw.min(year.abat10.retirees.plafond);
    let pensions_net = pensions_gross - abattement_pensions;

    // ------------------------------------------------------------------
    // 2. Capital income routing
    // ------------------------------------------------------------------
    let capital = &input.capital;
    let (capital_in_scale, dividend_abatement) = match capital.option {
        CapitalTaxOption::Pfu => (Decimal::ZERO, Decimal::ZERO),
        CapitalTaxOption::Bareme => {
            let abatement = capital.dividendes.max(Decimal::ZERO)
                * pct_to_rate(year.dividend_abatement);
            (capital.total() - abatement, abatement)
        }
    };
    let csg_deductible = match capital.option {
        CapitalTaxOption::Pfu => Decimal::ZERO,
        CapitalTaxOption::Bareme => {
            capital.total().max(Decimal::ZERO) * pct_to_rate(patrimony.csg_deductible_rate)
        }
    };

    let revenu_brut_global = salaries_net
        + pensions_net
        + independant
        + input.revenus_fonciers.max(Decimal::ZERO)
        + capital_in_scale;
    let taxable_income =
        (revenu_brut_global - input.charges_deductibles - csg_deductible).max(Decimal::ZERO);

    // ------------------------------------------------------------------
    // 3. Parts and quotient familial
    // ------------------------------------------------------------------
    let foyer = compute_parts(
        input.status,
        input.is_isolated,
        &input.children,
        input.extra_half_parts,
    );
    foyer.validate()?;

    let quotient = apply_quotient_cap(
        taxable_income,
        &foyer,
        &year.scale,
        &year.quotient_familial,
    );
    if quotient.qf_is_capped {
        warnings.push(format!(
            "Quotient familial advantage of {} capped at {}.",
            quotient.qf_advantage.round_dp(0),
            quotient.max_advantage.round_dp(0)
        ));
    }

    // ------------------------------------------------------------------
    // 4. Overseas rebate, décote, reductions
    // ------------------------------------------------------------------
    let dom_abatement = dom_rebate(quotient.ir_after_qf, input.location, year);
    let ir_after_dom = (quotient.ir_after_qf - dom_abatement).max(Decimal::ZERO);

    let decote = decote(ir_after_dom, input.status, year);
    let ir_after_decote = ir_after_dom - decote;

    let reductions = input.reductions_credits.max(Decimal::ZERO).min(ir_after_decote);
    let ir_net = ir_after_decote - reductions;

    // ------------------------------------------------------------------
    // 5. PFU, RFR and high-income contributions
    // ------------------------------------------------------------------
    let pfu_ir = match capital.option {
        CapitalTaxOption::Pfu => capital.total().max(Decimal::ZERO) * pct_to_rate(pfu.rate_ir),
        CapitalTaxOption::Bareme => Decimal::ZERO,
    };
    let pfu_capital = match capital.option {
        CapitalTaxOption::Pfu => capital.total().max(Decimal::ZERO),
        CapitalTaxOption::Bareme => Decimal::ZERO,
    };
    let rfr = taxable_income + pfu_capital + dividend_abatement;

    let cehr = compute_cehr(rfr, input.status, &year.cehr);
    let cdhr = compute_cdhr(
        &CdhrInput {
            rfr,
            status: input.status,
            dependents: input.children.len() as u32,
            ir_net,
            pfu_ir,
            cehr,
        },
        &year.cdhr,
    );
    if cdhr > Decimal::ZERO {
        warnings.push(format!(
            "CDHR of {} applies: taxes due fall below {}% of RFR.",
            cdhr.round_dp(0),
            year.cdhr.min_rate
        ));
    }

    // ------------------------------------------------------------------
    // 6. Social contributions
    // ------------------------------------------------------------------
    let social = compute_social_contributions(&SocialContributionsInput {
        patrimony_rate: patrimony.total_rate,
        foncier_base: input.revenus_fonciers,
        capital_with_ps_base: capital.total(),
    });
    let pension_ps = compute_pension_ps(
        pensions_gross,
        rfr,
        foyer.parts_nb,
        ps_settings.retirement.get(input.year),
    );

    let total_tax = ir_net + pfu_ir + cehr + cdhr + social.ps_total + pension_ps.amount;

    // ------------------------------------------------------------------
    // 7. Marginal rate annotation
    // ------------------------------------------------------------------
    let capped_tax = CappedTax::new(&foyer, &year.scale, &year.quotient_familial);
    let tmi = capped_tax.resolve_tmi(taxable_income);
    let brackets_detail = scaled_breakdown(taxable_income, &foyer, quotient.qf_is_capped, year);

    debug!(
        taxable_income = %taxable_income,
        parts = %foyer.parts_nb,
        ir_net = %ir_net,
        tmi = %tmi.rate,
        "income tax computed"
    );

    let output = IncomeTaxOutput {
        year_label: year.label.clone(),
        abattement_salaires,
        abattement_pensions,
        revenu_brut_global,
        csg_deductible,
        taxable_income,
        parts_nb: foyer.parts_nb,
        foyer,
        ir_before_qf: quotient.ir_before_qf,
        qf_advantage: quotient.qf_advantage,
        qf_is_capped: quotient.qf_is_capped,
        ir_after_qf: quotient.ir_after_qf,
        dom_abatement,
        decote,
        reductions,
        ir_net,
        pfu_ir,
        rfr,
        cehr,
        cdhr,
        ps_foncier: social.ps_foncier,
        ps_dividends: social.ps_dividends,
        ps_total: social.ps_total,
        ps_pensions: pension_ps.amount,
        total_tax,
        tmi_rate: tmi.rate,
        tmi_base_global: tmi.base_global,
        tmi_margin_global: tmi.margin_before_change,
        tmi_change_kind: tmi.change_kind,
        brackets_detail,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "French income tax: progressive scale with capped quotient familial, \
         DOM rebate, décote, PFU, CEHR/CDHR and social contributions",
        &serde_json::json!({
            "year": input.year,
            "status": input.status,
            "children": input.children.len(),
            "capital_option": input.capital.option,
            "location": input.location,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &IncomeTaxInput, warnings: &mut Vec<String>) -> FiscalResult<()> {
    if input.declarants.len() > 2 {
        return Err(FiscalError::InvalidInput {
            field: "declarants".into(),
            reason: "A tax household has at most two declarants".into(),
        });
    }
    for (i, d) in input.declarants.iter().enumerate() {
        if d.salaries < Decimal::ZERO || d.pensions < Decimal::ZERO {
            return Err(FiscalError::InvalidInput {
                field: format!("declarants[{i}]"),
                reason: "Salaries and pensions cannot be negative".into(),
            });
        }
    }
    if input.status == HouseholdStatus::Single && input.declarants.len() == 2 {
        warnings.push("Two declarants given for a single household; both incomes are counted.".into());
    }
    if input.is_isolated && input.status == HouseholdStatus::Couple {
        warnings.push("Isolated-parent flag ignored for a couple.".into());
    }
    Ok(())
}

/// 10% abatement bounded by floor and cap, never above the income itself.
fn ten_percent(income: Money, bounds: &AbatementBounds) -> Money {
    if income <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (income * pct_to_rate(bounds.rate))
        .max(bounds.plancher)
        .min(bounds.plafond)
        .min(income)
}

fn dom_rebate(ir: Money, location: Location, year: &IncomeTaxYear) -> Money {
    let rebate = match location {
        Location::Metropole => return Decimal::ZERO,
        Location::Gmr => &year.dom.gmr,
        Location::Guyane => &year.dom.guyane,
    };
    (ir * pct_to_rate(rebate.rate)).min(rebate.cap)
}

fn decote(ir: Money, status: HouseholdStatus, year: &IncomeTaxYear) -> Money {
    let (trigger, amount) = match status {
        HouseholdStatus::Single => (year.decote.trigger_single, year.decote.amount_single),
        HouseholdStatus::Couple => (year.decote.trigger_couple, year.decote.amount_couple),
    };
    if ir <= Decimal::ZERO || ir >= trigger {
        return Decimal::ZERO;
    }
    (amount - ir * pct_to_rate(year.decote.rate))
        .max(Decimal::ZERO)
        .min(ir)
}

/// Per-bracket detail scaled back to the household by the governing divisor.
fn scaled_breakdown(
    taxable_income: Money,
    foyer: &FoyerDescription,
    qf_is_capped: bool,
    year: &IncomeTaxYear,
) -> Vec<BracketSlice> {
    let divisor = if qf_is_capped {
        foyer.base_parts_for_qf
    } else {
        foyer.parts_nb
    };
    if divisor <= Decimal::ZERO {
        return Vec::new();
    }
    bracket_breakdown(&year.scale, taxable_income / divisor)
        .into_iter()
        .map(|s| BracketSlice {
            base: s.base * divisor,
            tax: s.tax * divisor,
            ..s
        })
        .collect()
}
