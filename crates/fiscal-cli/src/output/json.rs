use serde_json::Value;
use std::io::Write;

/// Pretty-print a result envelope to stdout, newline-terminated.
pub fn print_json(value: &Value) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = serde_json::to_writer_pretty(&mut out, value) {
        eprintln!("JSON serialization error: {e}");
        return;
    }
    let _ = writeln!(out);
}
