use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::brackets::TaxBracket;
use crate::error::FiscalError;
use crate::settings::{DmtgSettings, HeirCategory, PsSettings, TaxSettings};
use crate::types::{pct_to_rate, with_metadata, ComputationOutput, Money, Percent, Rate, TaxYear};
use crate::FiscalResult;

use super::catalog::{FieldDef, Phase, ProductCatalog, RuleRef};

pub const PRODUCT_ASSURANCE_VIE: &str = "assuranceVie";
pub const PRODUCT_PER: &str = "per";
pub const PRODUCT_PEA: &str = "pea";
pub const PRODUCT_CTO: &str = "cto";
pub const PRODUCT_SCPI: &str = "scpi";

/// Products whose rulesets feed `FiscalParams`, in resolution order.
pub const KNOWN_PRODUCTS: [&str; 5] = [
    PRODUCT_ASSURANCE_VIE,
    PRODUCT_PER,
    PRODUCT_PEA,
    PRODUCT_CTO,
    PRODUCT_SCPI,
];

/// PEA holding period after which gains only bear social contributions.
pub const DEFAULT_PEA_HOLDING_YEARS: u32 = 5;
/// IR rate on real-estate capital gains, in percent.
pub const DEFAULT_SCPI_PV_IR_PCT: Percent = dec!(19);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Rates and thresholds consumed by the placement simulation. Every rate is
/// already converted from percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalParams {
    pub pfu_rate_ir: Rate,
    pub ps_rate: Rate,
    /// PS on CTO income and gains; a CTO ruleset may override it alone.
    pub ps_rate_cto: Rate,
    pub csg_deductible_rate: Rate,
    pub dividend_abatement: Rate,
    pub av_abattement_single: Money,
    pub av_abattement_couple: Money,
    pub av_taux_reduit: Rate,
    pub av_seuil_primes: Money,
    pub av_duree_fiscale: u32,
    pub av_990i_abattement: Money,
    pub av_990i_taux_1: Rate,
    pub av_990i_seuil: Money,
    pub av_990i_taux_2: Rate,
    pub av_757b_abattement: Money,
    pub av_age_limite_primes: u32,
    pub per_gain_rate_ir: Rate,
    pub pea_duree_exoneration: u32,
    pub scpi_pv_rate_ir: Rate,
    pub dmtg: DmtgSettings,
}

impl FiscalParams {
    /// Parameters read directly from flat settings, without any ruleset.
    pub fn from_settings(tax: &TaxSettings, ps: &PsSettings, year: TaxYear) -> Self {
        let pfu = tax.pfu.get(year);
        let patrimony = ps.patrimony.get(year);
        let exit = &tax.assurance_vie_exit;
        let death = &tax.assurance_vie_death;
        Self {
            pfu_rate_ir: pct_to_rate(pfu.rate_ir),
            ps_rate: pct_to_rate(patrimony.total_rate),
            ps_rate_cto: pct_to_rate(patrimony.total_rate),
            csg_deductible_rate: pct_to_rate(patrimony.csg_deductible_rate),
            dividend_abatement: pct_to_rate(tax.income_tax.get(year).dividend_abatement),
            av_abattement_single: exit.abattement_single,
            av_abattement_couple: exit.abattement_couple,
            av_taux_reduit: pct_to_rate(exit.taux_reduit),
            av_seuil_primes: exit.seuil_primes,
            av_duree_fiscale: exit.duree_fiscale,
            av_990i_abattement: death.abattement_990i,
            av_990i_taux_1: pct_to_rate(death.taux_990i_1),
            av_990i_seuil: death.seuil_990i,
            av_990i_taux_2: pct_to_rate(death.taux_990i_2),
            av_757b_abattement: death.abattement_757b,
            av_age_limite_primes: death.age_limite_primes,
            per_gain_rate_ir: pct_to_rate(pfu.rate_ir),
            pea_duree_exoneration: DEFAULT_PEA_HOLDING_YEARS,
            scpi_pv_rate_ir: pct_to_rate(DEFAULT_SCPI_PV_IR_PCT),
            dmtg: tax.dmtg.clone(),
        }
    }
}

impl Default for FiscalParams {
    fn default() -> Self {
        Self::from_settings(&TaxSettings::default(), &PsSettings::default(), TaxYear::Current)
    }
}

/// Value found at the end of a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Number(Decimal),
    Brackets(Vec<TaxBracket>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no value at '{path}' in {table}")]
    UnknownPath { table: &'static str, path: String },
}

impl From<ResolveError> for FiscalError {
    fn from(e: ResolveError) -> Self {
        match &e {
            ResolveError::UnknownPath { table, path } => FiscalError::InvalidReference {
                reference: format!("$ref:{table}.{path}"),
                reason: e.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

fn parse_year(segment: &str) -> Option<TaxYear> {
    match segment {
        "current" => Some(TaxYear::Current),
        "previous" => Some(TaxYear::Previous),
        _ => None,
    }
}

fn parse_heir(segment: &str) -> Option<HeirCategory> {
    match segment {
        "ligne_directe" => Some(HeirCategory::LigneDirecte),
        "frere_soeur" => Some(HeirCategory::FrereSoeur),
        "neveu_niece" => Some(HeirCategory::NeveuNiece),
        "autre" => Some(HeirCategory::Autre),
        _ => None,
    }
}

fn resolve_tax_path(path: &[&str], tax: &TaxSettings) -> Option<ResolvedValue> {
    use ResolvedValue::{Brackets, Number};

    let value = match path {
        ["pfu", year, field] => {
            let pfu = tax.pfu.get(parse_year(year)?);
            match *field {
                "rate_ir" => Number(pfu.rate_ir),
                "rate_ps" => Number(pfu.rate_ps),
                "rate_total" => Number(pfu.rate_total),
                _ => return None,
            }
        }
        ["income_tax", year, "scale"] => Brackets(tax.income_tax.get(parse_year(year)?).scale.clone()),
        ["income_tax", year, "dividend_abatement"] => {
            Number(tax.income_tax.get(parse_year(year)?).dividend_abatement)
        }
        ["income_tax", year, "quotient_familial", field] => {
            let qf = &tax.income_tax.get(parse_year(year)?).quotient_familial;
            match *field {
                "plafond_demi_part" => Number(qf.plafond_demi_part),
                "plafond_parent_isole" => Number(qf.plafond_parent_isole),
                _ => return None,
            }
        }
        ["assurance_vie_exit", field] => {
            let exit = &tax.assurance_vie_exit;
            match *field {
                "abattement_single" => Number(exit.abattement_single),
                "abattement_couple" => Number(exit.abattement_couple),
                "taux_reduit" => Number(exit.taux_reduit),
                "seuil_primes" => Number(exit.seuil_primes),
                "duree_fiscale" => Number(Decimal::from(exit.duree_fiscale)),
                _ => return None,
            }
        }
        ["assurance_vie_death", field] => {
            let death = &tax.assurance_vie_death;
            match *field {
                "abattement_990i" => Number(death.abattement_990i),
                "taux_990i_1" => Number(death.taux_990i_1),
                "seuil_990i" => Number(death.seuil_990i),
                "taux_990i_2" => Number(death.taux_990i_2),
                "abattement_757b" => Number(death.abattement_757b),
                "age_limite_primes" => Number(Decimal::from(death.age_limite_primes)),
                _ => return None,
            }
        }
        ["dmtg", heir, "abattement"] => Number(tax.dmtg.category(parse_heir(heir)?).abattement),
        ["dmtg", heir, "scale"] => Brackets(tax.dmtg.category(parse_heir(heir)?).scale),
        _ => return None,
    };
    Some(value)
}

fn resolve_ps_path(path: &[&str], ps: &PsSettings) -> Option<ResolvedValue> {
    match path {
        ["patrimony", year, field] => {
            let patrimony = ps.patrimony.get(parse_year(year)?);
            match *field {
                "total_rate" => Some(ResolvedValue::Number(patrimony.total_rate)),
                "csg_deductible_rate" => Some(ResolvedValue::Number(patrimony.csg_deductible_rate)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Resolve a reference against the settings it points into.
pub fn resolve_ref(
    rule_ref: &RuleRef,
    tax: &TaxSettings,
    ps: &PsSettings,
) -> Result<ResolvedValue, ResolveError> {
    let segments = rule_ref.path_segments();
    let found = match rule_ref.table {
        super::catalog::SettingsTable::TaxSettings => resolve_tax_path(&segments, tax),
        super::catalog::SettingsTable::PsSettings => resolve_ps_path(&segments, ps),
    };
    found.ok_or_else(|| ResolveError::UnknownPath {
        table: rule_ref.table.as_str(),
        path: rule_ref.path.join("."),
    })
}

// ---------------------------------------------------------------------------
// Field bindings
// ---------------------------------------------------------------------------

/// How a ruleset value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Percent,
    Amount,
    Years,
}

/// `FiscalParams` slot fed by a ruleset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamTarget {
    AvAbattementSingle,
    AvAbattementCouple,
    AvTauxReduit,
    AvSeuilPrimes,
    AvDureeFiscale,
    Av990iAbattement,
    Av990iTaux1,
    Av990iSeuil,
    Av990iTaux2,
    Av757bAbattement,
    AvAgeLimitePrimes,
    PerGainRateIr,
    PeaDureeExoneration,
    PfuRateIr,
    CtoPsRate,
    ScpiPvRateIr,
}

impl ParamTarget {
    fn apply(self, params: &mut FiscalParams, value: Decimal, unit: Unit) -> Result<(), String> {
        let value = match unit {
            Unit::Percent => pct_to_rate(value),
            Unit::Amount | Unit::Years => value,
        };
        let years = || {
            value
                .trunc()
                .to_u32()
                .ok_or_else(|| format!("{value} is not a whole number of years"))
        };
        match self {
            ParamTarget::AvAbattementSingle => params.av_abattement_single = value,
            ParamTarget::AvAbattementCouple => params.av_abattement_couple = value,
            ParamTarget::AvTauxReduit => params.av_taux_reduit = value,
            ParamTarget::AvSeuilPrimes => params.av_seuil_primes = value,
            ParamTarget::AvDureeFiscale => params.av_duree_fiscale = years()?,
            ParamTarget::Av990iAbattement => params.av_990i_abattement = value,
            ParamTarget::Av990iTaux1 => params.av_990i_taux_1 = value,
            ParamTarget::Av990iSeuil => params.av_990i_seuil = value,
            ParamTarget::Av990iTaux2 => params.av_990i_taux_2 = value,
            ParamTarget::Av757bAbattement => params.av_757b_abattement = value,
            ParamTarget::AvAgeLimitePrimes => params.av_age_limite_primes = years()?,
            ParamTarget::PerGainRateIr => params.per_gain_rate_ir = value,
            ParamTarget::PeaDureeExoneration => params.pea_duree_exoneration = years()?,
            ParamTarget::PfuRateIr => params.pfu_rate_ir = value,
            ParamTarget::CtoPsRate => params.ps_rate_cto = value,
            ParamTarget::ScpiPvRateIr => params.scpi_pv_rate_ir = value,
        }
        Ok(())
    }
}

struct Binding {
    product: &'static str,
    phase: Phase,
    field: &'static str,
    unit: Unit,
    target: ParamTarget,
}

const fn bind(
    product: &'static str,
    phase: Phase,
    field: &'static str,
    unit: Unit,
    target: ParamTarget,
) -> Binding {
    Binding {
        product,
        phase,
        field,
        unit,
        target,
    }
}

const BINDINGS: [Binding; 16] = [
    bind(PRODUCT_ASSURANCE_VIE, Phase::Sortie, "abattement_single", Unit::Amount, ParamTarget::AvAbattementSingle),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Sortie, "abattement_couple", Unit::Amount, ParamTarget::AvAbattementCouple),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Sortie, "taux_reduit", Unit::Percent, ParamTarget::AvTauxReduit),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Sortie, "seuil_primes", Unit::Amount, ParamTarget::AvSeuilPrimes),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Sortie, "duree_fiscale", Unit::Years, ParamTarget::AvDureeFiscale),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "abattement_990i", Unit::Amount, ParamTarget::Av990iAbattement),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "taux_990i_1", Unit::Percent, ParamTarget::Av990iTaux1),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "seuil_990i", Unit::Amount, ParamTarget::Av990iSeuil),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "taux_990i_2", Unit::Percent, ParamTarget::Av990iTaux2),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "abattement_757b", Unit::Amount, ParamTarget::Av757bAbattement),
    bind(PRODUCT_ASSURANCE_VIE, Phase::Deces, "age_limite_primes", Unit::Years, ParamTarget::AvAgeLimitePrimes),
    bind(PRODUCT_PER, Phase::Sortie, "taux_pfu_ir", Unit::Percent, ParamTarget::PerGainRateIr),
    bind(PRODUCT_PEA, Phase::Sortie, "duree_exoneration", Unit::Years, ParamTarget::PeaDureeExoneration),
    bind(PRODUCT_CTO, Phase::Sortie, "taux_pfu_ir", Unit::Percent, ParamTarget::PfuRateIr),
    bind(PRODUCT_CTO, Phase::Sortie, "taux_ps", Unit::Percent, ParamTarget::CtoPsRate),
    bind(PRODUCT_SCPI, Phase::Sortie, "taux_pv_ir", Unit::Percent, ParamTarget::ScpiPvRateIr),
];

/// Numeric value of a field, following references.
fn field_number(field: &FieldDef, tax: &TaxSettings, ps: &PsSettings) -> Result<Decimal, String> {
    match field {
        FieldDef::Number { value } => Ok(*value),
        FieldDef::Ref { value } => match resolve_ref(value, tax, ps) {
            Ok(ResolvedValue::Number(n)) => Ok(n),
            Ok(ResolvedValue::Brackets(_)) => Err(format!("{value} points to a scale, not a number")),
            Err(e) => Err(e.to_string()),
        },
        FieldDef::Boolean { .. } | FieldDef::Enum { .. } | FieldDef::Brackets { .. } => {
            Err("field is not numeric".into())
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Build `FiscalParams` from the catalog rulesets in force at `target_date`
/// (the current versions when `None`), falling back on the flat settings for
/// anything the catalog does not define.
pub fn extract_params(
    catalog: &ProductCatalog,
    tax: &TaxSettings,
    ps: &PsSettings,
    target_date: Option<NaiveDate>,
) -> FiscalResult<ComputationOutput<FiscalParams>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let year = tax.tax_year_at(target_date);
    let mut params = FiscalParams::from_settings(tax, ps, year);
    let mut applied: Vec<String> = Vec::new();

    for product_id in KNOWN_PRODUCTS {
        let Some(product) = catalog.active_product(product_id) else {
            warnings.push(format!("Product '{product_id}' absent or inactive; defaults kept."));
            continue;
        };
        let Some(ruleset) = product.select_ruleset(target_date) else {
            warnings.push(format!(
                "Product '{product_id}' has no ruleset in force; defaults kept."
            ));
            continue;
        };

        for binding in BINDINGS.iter().filter(|b| b.product == product_id) {
            let Some(field) = ruleset.field(binding.phase, binding.field) else {
                debug!(product = product_id, field = binding.field, "field not set, default kept");
                continue;
            };
            let outcome = field_number(field, tax, ps)
                .and_then(|value| binding.target.apply(&mut params, value, binding.unit));
            match outcome {
                Ok(()) => applied.push(format!("{product_id}.{}", binding.field)),
                Err(reason) => {
                    warn!(product = product_id, field = binding.field, %reason, "default kept");
                    warnings.push(format!(
                        "{product_id}.{}: {reason}; default kept.",
                        binding.field
                    ));
                }
            }
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fiscal parameters from versioned product rulesets over flat tax/PS settings",
        &serde_json::json!({
            "target_date": target_date,
            "tax_year": year,
            "schema_version": catalog.schema_version,
            "fields_from_catalog": applied,
        }),
        warnings,
        elapsed,
        params,
    ))
}
