mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::income_tax::{IncomeTaxArgs, TmiArgs};
use commands::placement::{CompareArgs, SimulateArgs};
use commands::rules::{ExtractParamsArgs, MigrateCatalogArgs};
use commands::succession::SuccessionArgs;
use input::settings::FiscalContext;

/// French income tax and savings-envelope simulations
#[derive(Parser)]
#[command(
    name = "fisc",
    version,
    about = "French income tax and savings-envelope simulations",
    long_about = "A CLI for French household taxation with decimal precision: progressive \
                  income tax with the capped quotient familial, marginal rate, social \
                  contributions, CEHR/CDHR, inheritance duties, and year-by-year simulation \
                  of assurance-vie, PER, CTO, PEA and SCPI investments."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Tax settings file (JSON or YAML) replacing the built-in values
    #[arg(long, global = true)]
    tax_settings: Option<String>,

    /// Social contribution settings file (JSON or YAML)
    #[arg(long, global = true)]
    ps_settings: Option<String>,

    /// Product rules catalog (any schema version)
    #[arg(long, global = true)]
    catalog: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute household income tax, PS and high-income contributions
    IncomeTax(IncomeTaxArgs),
    /// Marginal rate and margin before it changes
    Tmi(TmiArgs),
    /// Simulate one product from savings to transmission
    Simulate(SimulateArgs),
    /// Simulate two products under the same assumptions and compare them
    Compare(CompareArgs),
    /// Resolve the fiscal parameters used by simulations
    ExtractParams(ExtractParamsArgs),
    /// Upgrade a stored rules catalog to the latest schema
    MigrateCatalog(MigrateCatalogArgs),
    /// Inheritance duties on an estate
    Succession(SuccessionArgs),
    /// Print the effective tax and PS settings
    Settings,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn run(cli: Cli) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    if let Commands::MigrateCatalog(args) = cli.command {
        return commands::rules::run_migrate_catalog(args);
    }
    let ctx = FiscalContext::load(
        cli.tax_settings.as_deref(),
        cli.ps_settings.as_deref(),
        cli.catalog.as_deref(),
    )?;
    match cli.command {
        Commands::IncomeTax(args) => commands::income_tax::run_income_tax(args, &ctx),
        Commands::Tmi(args) => commands::income_tax::run_tmi(args, &ctx),
        Commands::Simulate(args) => commands::placement::run_simulate(args, &ctx),
        Commands::Compare(args) => commands::placement::run_compare(args, &ctx),
        Commands::ExtractParams(args) => commands::rules::run_extract_params(args, &ctx),
        Commands::Succession(args) => commands::succession::run_succession(args, &ctx),
        Commands::Settings => Ok(serde_json::json!({
            "tax_settings": ctx.tax,
            "ps_settings": ctx.ps,
        })),
        Commands::MigrateCatalog(_) | Commands::Version => Ok(serde_json::Value::Null),
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("fisc {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    let format = cli.output.clone();

    match run(cli) {
        Ok(value) => {
            output::format_output(&format, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
