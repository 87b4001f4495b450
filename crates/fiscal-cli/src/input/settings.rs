use fiscal_core::rules::{migrate_catalog_with_warnings, ProductCatalog};
use fiscal_core::settings::{PsSettings, TaxSettings};
use tracing::debug;

use super::file::{read_input, read_value};

/// Settings and catalog shared by every command.
pub struct FiscalContext {
    pub tax: TaxSettings,
    pub ps: PsSettings,
    pub catalog: Option<ProductCatalog>,
    /// What the catalog migration could not carry over unchanged.
    pub catalog_warnings: Vec<String>,
}

impl FiscalContext {
    /// Built-in settings unless a file overrides them. A catalog of any known
    /// schema version is migrated on load.
    pub fn load(
        tax_path: Option<&str>,
        ps_path: Option<&str>,
        catalog_path: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let tax = match tax_path {
            Some(path) => read_input(path)?,
            None => TaxSettings::default(),
        };
        let ps = match ps_path {
            Some(path) => read_input(path)?,
            None => PsSettings::default(),
        };
        let (catalog, catalog_warnings) = match catalog_path {
            Some(path) => {
                let (catalog, warnings) = migrate_catalog_with_warnings(read_value(path)?)?;
                (Some(catalog), warnings)
            }
            None => (None, Vec::new()),
        };
        debug!(
            tax_file = tax_path.unwrap_or("built-in"),
            ps_file = ps_path.unwrap_or("built-in"),
            catalog = catalog_path.unwrap_or("none"),
            "fiscal context loaded"
        );
        Ok(Self {
            tax,
            ps,
            catalog,
            catalog_warnings,
        })
    }
}
