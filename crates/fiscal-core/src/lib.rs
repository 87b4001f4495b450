pub mod brackets;
pub mod error;
pub mod sanitize;
pub mod settings;
pub mod types;

#[cfg(feature = "income_tax")]
pub mod income_tax;

#[cfg(feature = "rules")]
pub mod rules;

#[cfg(feature = "succession")]
pub mod succession;

#[cfg(feature = "placement")]
pub mod placement;

pub use error::FiscalError;
pub use types::*;

/// Standard result type for all fiscal operations
pub type FiscalResult<T> = Result<T, FiscalError>;
