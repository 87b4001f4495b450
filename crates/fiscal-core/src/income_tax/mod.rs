pub mod marginal;
pub mod orchestrator;
pub mod quotient;
pub mod social;
pub mod surtax;

pub use marginal::{resolve_tmi, CappedTax, RateChangeKind, TmiInfo};
pub use orchestrator::{compute_income_tax, IncomeTaxInput, IncomeTaxOutput};
pub use quotient::{apply_quotient_cap, compute_parts, ChildCustody, FoyerDescription};
