use thiserror::Error;

#[derive(Debug, Error)]
pub enum FiscalError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid rule reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Ruleset version conflict for product {product}: {reason}")]
    VersionConflict { product: String, reason: String },

    #[error("Catalog migration failed at schema v{from_version}: {reason}")]
    Migration { from_version: u32, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FiscalError {
    fn from(e: serde_json::Error) -> Self {
        FiscalError::SerializationError(e.to_string())
    }
}
