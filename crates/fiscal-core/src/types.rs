use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values, in euros. Decimal keeps multi-decade recurrences free of float drift.
pub type Money = Decimal;

/// Rates expressed as decimals (0.128 = 12.8%). Never as percentages.
pub type Rate = Decimal;

/// Percentages as stored in settings and rulesets (12.8 = 12.8%).
pub type Percent = Decimal;

/// Fiscal year selector for year-keyed settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxYear {
    #[default]
    Current,
    Previous,
}

/// Household filing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdStatus {
    #[default]
    Single,
    Couple,
}

impl HouseholdStatus {
    pub fn is_couple(self) -> bool {
        matches!(self, HouseholdStatus::Couple)
    }
}

/// A value keyed by fiscal year, as settings are published (`current` / `previous`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearKeyed<T> {
    pub current: T,
    pub previous: T,
}

impl<T> YearKeyed<T> {
    pub fn get(&self, year: TaxYear) -> &T {
        match year {
            TaxYear::Current => &self.current,
            TaxYear::Previous => &self.previous,
        }
    }
}

/// Convert a stored percentage into a rate.
pub fn pct_to_rate(pct: Percent) -> Rate {
    pct / Decimal::ONE_HUNDRED
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
