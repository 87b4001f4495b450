use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use tracing::info;

use fiscal_core::rules::migration::detect_version;
use fiscal_core::rules::{
    extract_params, migrate_catalog_with_warnings, migrate_to_latest, ProductCatalog,
};

use crate::input;
use crate::input::settings::FiscalContext;

/// Arguments for parameter extraction
#[derive(Args)]
pub struct ExtractParamsArgs {
    /// Rules in force at this date (YYYY-MM-DD); latest versions if absent
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

pub fn run_extract_params(
    args: ExtractParamsArgs,
    ctx: &FiscalContext,
) -> Result<Value, Box<dyn std::error::Error>> {
    let empty = ProductCatalog::default();
    let catalog = ctx.catalog.as_ref().unwrap_or(&empty);
    let mut result = extract_params(catalog, &ctx.tax, &ctx.ps, args.date)?;
    let mut warnings = ctx.catalog_warnings.clone();
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for catalog migration
#[derive(Args)]
pub struct MigrateCatalogArgs {
    /// Path to the stored catalog (JSON or YAML)
    #[arg(long)]
    pub input: String,

    /// Fail instead of returning the catalog unchanged when it cannot be migrated
    #[arg(long)]
    pub strict: bool,
}

pub fn run_migrate_catalog(args: MigrateCatalogArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let stored = input::file::read_value(&args.input)?;
    if args.strict {
        let from_version = detect_version(&stored);
        let (catalog, warnings) = migrate_catalog_with_warnings(stored)?;
        return Ok(serde_json::json!({
            "from_version": from_version,
            "catalog": catalog,
            "warnings": warnings,
        }));
    }
    let from_version = detect_version(&stored);
    let migrated = migrate_to_latest(stored);
    info!(
        ?from_version,
        to_version = ?detect_version(&migrated),
        "catalog migration"
    );
    Ok(migrated)
}
