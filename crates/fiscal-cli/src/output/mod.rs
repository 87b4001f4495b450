pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use colored::Colorize;
use serde_json::Value;

use crate::OutputFormat;

/// Print a command result in the requested format. JSON keeps the whole
/// envelope; the other formats drop it, so its warnings go to stderr.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
    if !matches!(format, OutputFormat::Json) {
        print_warnings(value);
    }
}

fn print_warnings(value: &Value) {
    let Some(warnings) = value.get("warnings").and_then(Value::as_array) else {
        return;
    };
    for w in warnings.iter().filter_map(Value::as_str) {
        eprintln!("{} {}", "warning:".yellow().bold(), w);
    }
}
