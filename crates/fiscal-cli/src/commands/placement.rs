use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use tracing::info;

use fiscal_core::placement::{simulate_comparison, simulate_complete, ComparisonInput, SimulationInput};
use fiscal_core::rules::{extract_params, FiscalParams};

use crate::input;
use crate::input::settings::FiscalContext;

/// Parameters from the catalog when one is loaded, else from the flat settings.
pub fn resolve_params(
    ctx: &FiscalContext,
    date: Option<NaiveDate>,
) -> Result<(FiscalParams, Vec<String>), Box<dyn std::error::Error>> {
    match &ctx.catalog {
        Some(catalog) => {
            let mut out = extract_params(catalog, &ctx.tax, &ctx.ps, date)?;
            let mut warnings = ctx.catalog_warnings.clone();
            warnings.append(&mut out.warnings);
            Ok((out.result, warnings))
        }
        None => Ok((
            FiscalParams::from_settings(&ctx.tax, &ctx.ps, ctx.tax.tax_year_at(date)),
            Vec::new(),
        )),
    }
}

/// Arguments for a single-product simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML simulation input
    #[arg(long)]
    pub input: Option<String>,

    /// Apply the catalog rules in force at this date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

pub fn run_simulate(args: SimulateArgs, ctx: &FiscalContext) -> Result<Value, Box<dyn std::error::Error>> {
    let sim_input: SimulationInput = input::stdin::read_piped_or_file(args.input.as_deref())?
        .ok_or("--input <file> or stdin required for simulate")?;
    let (sim_input, clamp_warnings) = sim_input.sanitized();
    let (params, param_warnings) = resolve_params(ctx, args.date)?;

    info!(envelope = ?sim_input.product.envelope, "running simulation");
    let mut output = simulate_complete(&sim_input, &params)?;
    let mut warnings = clamp_warnings;
    warnings.extend(param_warnings);
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    Ok(serde_json::to_value(output)?)
}

/// Arguments for a two-product comparison
#[derive(Args)]
pub struct CompareArgs {
    /// Path to JSON/YAML comparison input
    #[arg(long)]
    pub input: Option<String>,

    /// Apply the catalog rules in force at this date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

pub fn run_compare(args: CompareArgs, ctx: &FiscalContext) -> Result<Value, Box<dyn std::error::Error>> {
    let cmp_input: ComparisonInput = input::stdin::read_piped_or_file(args.input.as_deref())?
        .ok_or("--input <file> or stdin required for compare")?;
    let (params, param_warnings) = resolve_params(ctx, args.date)?;
    let mut output = simulate_comparison(&cmp_input, &params)?;
    let mut warnings = param_warnings;
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    Ok(serde_json::to_value(output)?)
}
