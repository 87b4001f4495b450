use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use fiscal_core::income_tax::{compute_income_tax, IncomeTaxInput};
use fiscal_core::placement::{simulate_comparison, simulate_complete, ComparisonInput, SimulationInput};
use fiscal_core::rules::{
    extract_params, load_catalog, migrate_catalog_with_warnings, migrate_to_latest, FiscalParams,
};
use fiscal_core::settings::{PsSettings, TaxSettings};
use fiscal_core::succession::compute_succession;
use fiscal_core::succession::dmtg::SuccessionInput;
use fiscal_core::TaxYear;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Optional settings passed alongside a request; built-in values otherwise.
#[derive(Deserialize, Default)]
struct SettingsOverride {
    #[serde(default)]
    tax_settings: Option<TaxSettings>,
    #[serde(default)]
    ps_settings: Option<PsSettings>,
    #[serde(default)]
    catalog: Option<serde_json::Value>,
    #[serde(default)]
    date: Option<chrono::NaiveDate>,
}

impl SettingsOverride {
    fn parse(settings_json: Option<String>) -> NapiResult<Self> {
        match settings_json {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(to_napi_error),
            _ => Ok(Self::default()),
        }
    }

    fn tax(&self) -> TaxSettings {
        self.tax_settings.clone().unwrap_or_default()
    }

    fn ps(&self) -> PsSettings {
        self.ps_settings.clone().unwrap_or_default()
    }

    fn params(&self) -> NapiResult<FiscalParams> {
        let (tax, ps) = (self.tax(), self.ps());
        match &self.catalog {
            Some(raw) => {
                let catalog = load_catalog(raw.clone()).map_err(to_napi_error)?;
                let out = extract_params(&catalog, &tax, &ps, self.date).map_err(to_napi_error)?;
                Ok(out.result)
            }
            None => Ok(FiscalParams::from_settings(&tax, &ps, tax.tax_year_at(self.date))),
        }
    }
}

// ---------------------------------------------------------------------------
// Income tax
// ---------------------------------------------------------------------------

#[napi]
pub fn income_tax(input_json: String, settings_json: Option<String>) -> NapiResult<String> {
    let input: IncomeTaxInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let settings = SettingsOverride::parse(settings_json)?;
    let output =
        compute_income_tax(&input, &settings.tax(), &settings.ps()).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[napi]
pub fn simulate_placement(input_json: String, settings_json: Option<String>) -> NapiResult<String> {
    let input: SimulationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let (input, clamp_warnings) = input.sanitized();
    let params = SettingsOverride::parse(settings_json)?.params()?;
    let mut output = simulate_complete(&input, &params).map_err(to_napi_error)?;
    let mut warnings = clamp_warnings;
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn compare_placements(input_json: String, settings_json: Option<String>) -> NapiResult<String> {
    let input: ComparisonInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let params = SettingsOverride::parse(settings_json)?.params()?;
    let output = simulate_comparison(&input, &params).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[napi]
pub fn migrate_catalog(catalog_json: String) -> NapiResult<String> {
    let stored: serde_json::Value = serde_json::from_str(&catalog_json).map_err(to_napi_error)?;
    serde_json::to_string(&migrate_to_latest(stored)).map_err(to_napi_error)
}

/// Strict migration returning `{catalog, warnings}`; fails on shapes it
/// cannot read.
#[napi]
pub fn load_catalog_checked(catalog_json: String) -> NapiResult<String> {
    let stored: serde_json::Value = serde_json::from_str(&catalog_json).map_err(to_napi_error)?;
    let (catalog, warnings) = migrate_catalog_with_warnings(stored).map_err(to_napi_error)?;
    serde_json::to_string(&serde_json::json!({ "catalog": catalog, "warnings": warnings }))
        .map_err(to_napi_error)
}

#[napi]
pub fn fiscal_params(settings_json: Option<String>) -> NapiResult<String> {
    let params = SettingsOverride::parse(settings_json)?.params()?;
    serde_json::to_string(&params).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Succession
// ---------------------------------------------------------------------------

#[napi]
pub fn succession(input_json: String, settings_json: Option<String>) -> NapiResult<String> {
    let input: SuccessionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let settings = SettingsOverride::parse(settings_json)?;
    let ps_rate = settings.ps().patrimony.get(TaxYear::Current).total_rate;
    let output = compute_succession(&input, &settings.tax(), ps_rate).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
