use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use fiscal_core::succession::compute_succession;
use fiscal_core::succession::dmtg::SuccessionInput;
use fiscal_core::TaxYear;

use super::HeirArg;
use crate::input;
use crate::input::settings::FiscalContext;

/// Arguments for DMTG on an estate
#[derive(Args)]
pub struct SuccessionArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Capital transmitted
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Number of beneficiaries sharing the capital
    #[arg(long, default_value_t = 1)]
    pub beneficiaries: u32,

    /// Relationship of the beneficiaries to the deceased
    #[arg(long, value_enum, default_value = "ligne-directe")]
    pub heir: HeirArg,

    /// Latent gain subject to PS at death
    #[arg(long, default_value_t = dec!(0))]
    pub gain: Decimal,
}

pub fn run_succession(
    args: SuccessionArgs,
    ctx: &FiscalContext,
) -> Result<Value, Box<dyn std::error::Error>> {
    let succession_input: SuccessionInput =
        if let Some(data) = input::stdin::read_piped_or_file(args.input.as_deref())? {
            data
        } else {
            let capital = args
                .capital
                .ok_or("--capital is required (or provide --input)")?;
            SuccessionInput {
                capital,
                gain_soumis_ps: args.gain,
                nb_beneficiaires: args.beneficiaries,
                heir: args.heir.into(),
            }
        };
    let ps_rate = ctx.ps.patrimony.get(TaxYear::Current).total_rate;
    let result = compute_succession(&succession_input, &ctx.tax, ps_rate)?;
    Ok(serde_json::to_value(result)?)
}
