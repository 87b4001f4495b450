//! Multi-envelope savings simulation: constitution with capitalisation and
//! distribution pockets, liquidation with per-envelope exit taxation, and
//! transmission at death.

pub mod comparison;
pub mod engine;
pub mod envelope;
pub mod types;

pub use comparison::{compare_products, simulate_comparison, Comparison, ComparisonInput};
pub use engine::{normalize_versement_config, run_simulation, simulate_complete};
pub use envelope::{distribution_tax, split_withdrawal, withdrawal_tax};
pub use types::*;
