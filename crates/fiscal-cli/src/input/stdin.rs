use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{self, Read};

use super::file::read_input;

/// Piped stdin as a document, JSON or YAML. `None` on an interactive
/// terminal or an empty pipe.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        return Ok(Some(serde_json::from_str(raw)?));
    }
    Ok(Some(serde_yaml::from_str(raw)?))
}

/// Household, product or estate record from `--input`, else from stdin.
pub fn read_piped_or_file<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Some(read_input(path)?)),
        None => read_stdin()?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into),
    }
}
