pub mod catalog;
pub mod migration;
pub mod resolver;

pub use catalog::{FieldDef, Phase, Product, ProductCatalog, RuleRef, Ruleset, LATEST_SCHEMA_VERSION};
pub use migration::{load_catalog, migrate_catalog_with_warnings, migrate_to_latest};
pub use resolver::{extract_params, resolve_ref, FiscalParams};
