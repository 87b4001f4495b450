use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use fiscal_core::income_tax::orchestrator::DeclarantIncome;
use fiscal_core::income_tax::{
    compute_income_tax, compute_parts, resolve_tmi, ChildCustody, IncomeTaxInput,
};
use fiscal_core::types::{with_metadata, TaxYear};

use super::{StatusArg, YearArg};
use crate::input;
use crate::input::settings::FiscalContext;

/// Arguments for the household income tax computation
#[derive(Args)]
pub struct IncomeTaxArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Filing status
    #[arg(long, value_enum, default_value = "single")]
    pub status: StatusArg,

    /// Salaries per declarant (comma-separated, e.g. "42000,31000")
    #[arg(long, value_delimiter = ',')]
    pub salaries: Option<Vec<Decimal>>,

    /// Pensions per declarant (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub pensions: Option<Vec<Decimal>>,

    /// Dependent children
    #[arg(long, default_value_t = 0)]
    pub children: u32,

    /// Children in shared custody
    #[arg(long, default_value_t = 0)]
    pub shared_children: u32,

    /// Single parent raising children alone
    #[arg(long)]
    pub isolated: bool,

    /// Fiscal year of the scale
    #[arg(long, value_enum, default_value = "current")]
    pub year: YearArg,
}

fn children(dependents: u32, shared: u32) -> Vec<ChildCustody> {
    let mut out = vec![ChildCustody::Charge; dependents as usize];
    out.extend(std::iter::repeat(ChildCustody::Partagee).take(shared as usize));
    out
}

pub fn run_income_tax(
    args: IncomeTaxArgs,
    ctx: &FiscalContext,
) -> Result<Value, Box<dyn std::error::Error>> {
    let tax_input: IncomeTaxInput =
        if let Some(data) = input::stdin::read_piped_or_file(args.input.as_deref())? {
            data
        } else {
            let salaries = args.salaries.unwrap_or_default();
            let pensions = args.pensions.unwrap_or_default();
            if salaries.is_empty() && pensions.is_empty() {
                return Err("--salaries or --pensions is required (or provide --input)".into());
            }
            let declarants = (0..salaries.len().max(pensions.len()))
                .map(|i| DeclarantIncome {
                    salaries: salaries.get(i).copied().unwrap_or_default(),
                    pensions: pensions.get(i).copied().unwrap_or_default(),
                    ..Default::default()
                })
                .collect();
            IncomeTaxInput {
                year: args.year.into(),
                status: args.status.into(),
                is_isolated: args.isolated,
                children: children(args.children, args.shared_children),
                extra_half_parts: 0,
                location: Default::default(),
                declarants,
                revenus_fonciers: Decimal::ZERO,
                capital: Default::default(),
                charges_deductibles: Decimal::ZERO,
                reductions_credits: Decimal::ZERO,
            }
        };

    let result = compute_income_tax(&tax_input, &ctx.tax, &ctx.ps)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the marginal rate lookup
#[derive(Args)]
pub struct TmiArgs {
    /// Net taxable income of the household
    #[arg(long)]
    pub income: Decimal,

    /// Filing status
    #[arg(long, value_enum, default_value = "single")]
    pub status: StatusArg,

    /// Dependent children
    #[arg(long, default_value_t = 0)]
    pub children: u32,

    /// Children in shared custody
    #[arg(long, default_value_t = 0)]
    pub shared_children: u32,

    /// Single parent raising children alone
    #[arg(long)]
    pub isolated: bool,

    /// Fiscal year of the scale
    #[arg(long, value_enum, default_value = "current")]
    pub year: YearArg,
}

pub fn run_tmi(args: TmiArgs, ctx: &FiscalContext) -> Result<Value, Box<dyn std::error::Error>> {
    let start = std::time::Instant::now();
    let foyer = compute_parts(
        args.status.into(),
        args.isolated,
        &children(args.children, args.shared_children),
        0,
    );
    foyer.validate()?;
    let year: TaxYear = args.year.into();
    let settings = ctx.tax.income_tax.get(year);
    let tmi = resolve_tmi(args.income, &foyer, &settings.scale, &settings.quotient_familial);
    let output = with_metadata(
        "Marginal rate read off the capped tax function",
        &serde_json::json!({ "income": args.income, "parts": foyer.parts_nb, "year": year }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        tmi,
    );
    Ok(serde_json::to_value(output)?)
}
