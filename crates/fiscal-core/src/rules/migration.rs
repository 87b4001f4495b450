//! Schema migration for persisted product catalogs.
//!
//! Each schema version has its own typed shape and a pure step to the next
//! one. `migrate_to_latest` detects the stored version, parses the matching
//! shape and applies the steps in order. Anything it does not recognize is
//! returned untouched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::FiscalError;
use crate::FiscalResult;

use super::catalog::{
    Block, FieldDef, Holders, Phase, Phases, Product, ProductCatalog, Ruleset,
    LATEST_SCHEMA_VERSION,
};

/// Sub-products merged into [`PRECIOUS_METALS_ID`] by the v3 to v4 step.
pub const PRECIOUS_METAL_IDS: [&str; 3] = ["or", "argent", "metaux_autres"];
pub const PRECIOUS_METALS_ID: &str = "metauxPrecieux";

// ---------------------------------------------------------------------------
// Versioned shapes
// ---------------------------------------------------------------------------

/// v1: one flat list of blocks per product, no versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogV1 {
    #[serde(default)]
    pub products: Vec<ProductV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductV1 {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub holders: Holders,
    #[serde(default)]
    pub rules: Vec<BlockV1>,
}

/// Block carrying the phase it was displayed under, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockV1 {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

/// v2: dated rulesets, blocks not yet split by phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogV2 {
    #[serde(default)]
    pub products: Vec<ProductV2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductV2 {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub holders: Holders,
    #[serde(default)]
    pub rulesets: Vec<RulesetV2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetV2 {
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub blocks: Vec<BlockV1>,
}

fn default_active() -> bool {
    true
}

/// From v3 on, the catalog has its final shape; later steps only rework the
/// product list.
#[derive(Debug, Clone)]
pub enum VersionedCatalog {
    V1(CatalogV1),
    V2(CatalogV2),
    V3(ProductCatalog),
    V4(ProductCatalog),
    V5(ProductCatalog),
}

impl VersionedCatalog {
    pub fn version(&self) -> u32 {
        match self {
            VersionedCatalog::V1(_) => 1,
            VersionedCatalog::V2(_) => 2,
            VersionedCatalog::V3(_) => 3,
            VersionedCatalog::V4(_) => 4,
            VersionedCatalog::V5(_) => 5,
        }
    }

    /// Parse `value` as the shape of schema `version`.
    pub fn parse(value: Value, version: u32) -> FiscalResult<Self> {
        let migration_err = |e: serde_json::Error| FiscalError::Migration {
            from_version: version,
            reason: e.to_string(),
        };
        let parsed = match version {
            1 => VersionedCatalog::V1(serde_json::from_value(value).map_err(migration_err)?),
            2 => VersionedCatalog::V2(serde_json::from_value(value).map_err(migration_err)?),
            3..=5 => {
                let catalog: ProductCatalog =
                    serde_json::from_value(value).map_err(migration_err)?;
                match version {
                    3 => VersionedCatalog::V3(catalog),
                    4 => VersionedCatalog::V4(catalog),
                    _ => VersionedCatalog::V5(catalog),
                }
            }
            other => {
                return Err(FiscalError::Migration {
                    from_version: other,
                    reason: "unknown schema version".into(),
                })
            }
        };
        Ok(parsed)
    }

    /// Apply one migration step. The latest version maps to itself. Anything
    /// the step could not carry over unchanged is reported in `warnings`.
    pub fn step(self, warnings: &mut Vec<String>) -> Self {
        match self {
            VersionedCatalog::V1(c) => VersionedCatalog::V2(v1_to_v2(c)),
            VersionedCatalog::V2(c) => VersionedCatalog::V3(v2_to_v3(c)),
            VersionedCatalog::V3(c) => VersionedCatalog::V4(v3_to_v4(c, warnings)),
            VersionedCatalog::V4(c) => VersionedCatalog::V5(v4_to_v5(c)),
            latest @ VersionedCatalog::V5(_) => latest,
        }
    }

    /// Run every remaining step. Rulesets come back most recent first
    /// whatever order they were stored in.
    pub fn into_latest(self, warnings: &mut Vec<String>) -> ProductCatalog {
        let mut current = self;
        loop {
            debug!(version = current.version(), "catalog migration step");
            current = match current {
                VersionedCatalog::V5(mut catalog) => {
                    catalog.schema_version = LATEST_SCHEMA_VERSION;
                    for product in &mut catalog.products {
                        product.sort_rulesets();
                    }
                    return catalog;
                }
                other => other.step(warnings),
            };
        }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Wrap each product's flat blocks into a single ruleset dated at the epoch,
/// so that it stays in force for every target date.
fn v1_to_v2(catalog: CatalogV1) -> CatalogV2 {
    let products = catalog
        .products
        .into_iter()
        .map(|p| ProductV2 {
            id: p.id,
            label: p.label,
            active: p.active,
            holders: p.holders,
            rulesets: vec![RulesetV2 {
                // 1970-01-01
                effective_date: NaiveDate::default(),
                blocks: p.rules,
            }],
        })
        .collect();
    CatalogV2 { products }
}

/// Distribute blocks into phases by their hint; unhinted blocks belong to
/// the constitution phase.
fn v2_to_v3(catalog: CatalogV2) -> ProductCatalog {
    let products = catalog
        .products
        .into_iter()
        .map(|p| {
            let rulesets = p
                .rulesets
                .into_iter()
                .map(|rs| {
                    let mut phases = Phases::default();
                    for b in rs.blocks {
                        let phase = b.phase.unwrap_or(Phase::Constitution);
                        phases.get_mut(phase).push(Block {
                            id: b.id,
                            label: b.label,
                            fields: b.fields,
                        });
                    }
                    Ruleset {
                        effective_date: rs.effective_date,
                        phases,
                    }
                })
                .collect();
            let mut product = Product {
                id: p.id,
                label: p.label,
                active: p.active,
                holders: p.holders,
                rulesets,
            };
            product.sort_rulesets();
            product
        })
        .collect();
    ProductCatalog {
        schema_version: 3,
        products,
    }
}

/// Merge `incoming` into a block with the same id, field by field. Fields the
/// target lacks are added; a field defined differently on both sides keeps
/// the target's value and is reported.
fn merge_block(
    target: &mut Block,
    incoming: Block,
    source: &str,
    effective_date: NaiveDate,
    warnings: &mut Vec<String>,
) {
    if target.label.is_empty() {
        target.label = incoming.label;
    }
    for (name, def) in incoming.fields {
        match target.fields.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(def);
            }
            Entry::Occupied(kept) if *kept.get() == def => {}
            Entry::Occupied(kept) => {
                warn!(block = %target.id, field = %kept.key(), source, "conflicting field during metal merge");
                warnings.push(format!(
                    "{PRECIOUS_METALS_ID} ruleset {effective_date}: {}.{} from '{source}' differs from an earlier metal; earlier value kept.",
                    target.id,
                    kept.key()
                ));
            }
        }
    }
}

fn merge_phases(
    target: &mut Phases,
    mut other: Phases,
    source: &str,
    effective_date: NaiveDate,
    warnings: &mut Vec<String>,
) {
    for phase in Phase::ALL {
        let blocks = target.get_mut(phase);
        for block in std::mem::take(other.get_mut(phase)) {
            match blocks.iter_mut().find(|b| b.id == block.id) {
                Some(existing) => merge_block(existing, block, source, effective_date, warnings),
                None => blocks.push(block),
            }
        }
    }
}

/// Collapse the precious-metal sub-products into one product, placed where
/// the first of them stood. The first one in catalog order wins on
/// conflicting fields; nothing else is dropped.
fn v3_to_v4(catalog: ProductCatalog, warnings: &mut Vec<String>) -> ProductCatalog {
    let mut merged: Option<Product> = None;
    let mut merged_at: Option<usize> = None;
    let mut products: Vec<Product> = Vec::with_capacity(catalog.products.len());

    for product in catalog.products {
        if !PRECIOUS_METAL_IDS.contains(&product.id.as_str()) {
            products.push(product);
            continue;
        }
        match merged.as_mut() {
            None => {
                merged_at = Some(products.len());
                merged = Some(Product {
                    id: PRECIOUS_METALS_ID.to_string(),
                    label: "Métaux précieux".to_string(),
                    ..product
                });
            }
            Some(target) => {
                target.active |= product.active;
                for rs in product.rulesets {
                    match target
                        .rulesets
                        .iter_mut()
                        .find(|t| t.effective_date == rs.effective_date)
                    {
                        Some(existing) => merge_phases(
                            &mut existing.phases,
                            rs.phases,
                            &product.id,
                            rs.effective_date,
                            warnings,
                        ),
                        None => target.rulesets.push(rs),
                    }
                }
                target.sort_rulesets();
            }
        }
    }

    if let (Some(product), Some(at)) = (merged, merged_at) {
        products.insert(at, product);
    }
    ProductCatalog {
        schema_version: 4,
        products,
    }
}

/// Split dual-holder products into a natural-person and a legal-entity copy.
fn v4_to_v5(catalog: ProductCatalog) -> ProductCatalog {
    let mut products = Vec::with_capacity(catalog.products.len());
    for product in catalog.products {
        if product.holders != Holders::PpPm {
            products.push(product);
            continue;
        }
        let pp = Product {
            id: format!("{}_pp", product.id),
            label: format!("{} (PP)", product.label),
            holders: Holders::Pp,
            ..product.clone()
        };
        let pm = Product {
            id: format!("{}_pm", product.id),
            label: format!("{} (PM)", product.label),
            holders: Holders::Pm,
            ..product
        };
        products.push(pp);
        products.push(pm);
    }
    ProductCatalog {
        schema_version: 5,
        products,
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Stored schema version. A catalog without one is v1 when its products still
/// carry flat `rules`.
pub fn detect_version(value: &Value) -> Option<u32> {
    if let Some(v) = value.get("schema_version") {
        return v.as_u64().and_then(|v| u32::try_from(v).ok());
    }
    let products = value.get("products")?.as_array()?;
    let flat = products.iter().all(|p| p.get("rulesets").is_none());
    flat.then_some(1)
}

/// Strict migration: fails on unknown versions or shapes. Also returns what
/// the steps could not carry over as-is, for the caller to surface.
pub fn migrate_catalog_with_warnings(value: Value) -> FiscalResult<(ProductCatalog, Vec<String>)> {
    let version = detect_version(&value).ok_or_else(|| FiscalError::Migration {
        from_version: 0,
        reason: "cannot determine schema version".into(),
    })?;
    if version > LATEST_SCHEMA_VERSION {
        return Err(FiscalError::Migration {
            from_version: version,
            reason: format!("newer than supported v{LATEST_SCHEMA_VERSION}"),
        });
    }
    let mut warnings = Vec::new();
    let catalog = VersionedCatalog::parse(value, version)?.into_latest(&mut warnings);
    Ok((catalog, warnings))
}

/// Strict migration: fails on unknown versions or shapes.
pub fn migrate_catalog(value: Value) -> FiscalResult<ProductCatalog> {
    migrate_catalog_with_warnings(value).map(|(catalog, _)| catalog)
}

/// Upgrade a stored catalog to the latest schema. Catalogs already at the
/// latest version, and anything that cannot be migrated, come back unchanged.
pub fn migrate_to_latest(value: Value) -> Value {
    match detect_version(&value) {
        Some(LATEST_SCHEMA_VERSION) => return value,
        None => {
            warn!("catalog schema version not recognized, left unchanged");
            return value;
        }
        Some(_) => {}
    }
    let migrated = migrate_catalog(value.clone()).and_then(|catalog| {
        serde_json::to_value(catalog).map_err(FiscalError::from)
    });
    match migrated {
        Ok(latest) => latest,
        Err(e) => {
            warn!(error = %e, "catalog migration skipped");
            value
        }
    }
}

/// Parse a stored catalog of any known version into the latest shape.
/// Unlike [`migrate_to_latest`], failures are reported.
pub fn load_catalog(value: Value) -> FiscalResult<ProductCatalog> {
    migrate_catalog(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn v1_catalog() -> Value {
        json!({
            "products": [
                {
                    "id": "cto",
                    "label": "Compte-titres",
                    "rules": [
                        {"id": "versements", "fields": {"frais": {"type": "number", "value": "1"}}},
                        {"id": "fiscalite", "phase": "sortie",
                         "fields": {"taux_pfu_ir": {"type": "ref", "value": "$ref:tax_settings.pfu.current.rate_ir"}}}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_detect_version() {
        assert_eq!(detect_version(&v1_catalog()), Some(1));
        assert_eq!(detect_version(&json!({"schema_version": 3, "products": []})), Some(3));
        assert_eq!(detect_version(&json!({"foo": 1})), None);
        assert_eq!(detect_version(&json!({"schema_version": "x"})), None);
    }

    #[test]
    fn test_v1_chain_to_latest() {
        let catalog = migrate_catalog(v1_catalog()).unwrap();
        assert_eq!(catalog.schema_version, LATEST_SCHEMA_VERSION);
        let cto = &catalog.products[0];
        assert_eq!(cto.rulesets.len(), 1);
        let rs = &cto.rulesets[0];
        assert_eq!(rs.effective_date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(rs.phases.constitution[0].id, "versements");
        assert_eq!(rs.phases.sortie[0].id, "fiscalite");
        assert!(rs.phases.deces.is_empty());
    }

    #[test]
    fn test_user_overrides_survive_migration() {
        let catalog = migrate_catalog(v1_catalog()).unwrap();
        let field = catalog.products[0].rulesets[0].field(Phase::Sortie, "taux_pfu_ir");
        assert!(matches!(field, Some(FieldDef::Ref { .. })));
    }

    #[test]
    fn test_precious_metals_merged_first_wins() {
        let value = json!({
            "schema_version": 3,
            "products": [
                {"id": "pea", "rulesets": []},
                {"id": "or", "label": "Or", "rulesets": [{
                    "effective_date": "2020-01-01",
                    "phases": {"sortie": [{"id": "taxe", "fields": {"taux": {"type": "number", "value": "11.5"}}}]}
                }]},
                {"id": "argent", "active": false, "rulesets": [{
                    "effective_date": "2020-01-01",
                    "phases": {"sortie": [
                        {"id": "taxe", "fields": {"taux": {"type": "number", "value": "99"}}},
                        {"id": "stockage", "fields": {}}
                    ]}
                }]},
                {"id": "metaux_autres", "rulesets": [{"effective_date": "2015-01-01"}]}
            ]
        });
        let (catalog, warnings) = migrate_catalog_with_warnings(value).unwrap();
        let ids: Vec<_> = catalog.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["pea", PRECIOUS_METALS_ID]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("taxe.taux from 'argent'"));
        let metals = &catalog.products[1];
        assert_eq!(metals.rulesets.len(), 2);
        let sortie = &metals.rulesets[0].phases.sortie;
        assert_eq!(sortie.len(), 2);
        assert_eq!(
            sortie[0].fields["taux"],
            FieldDef::Number { value: rust_decimal_macros::dec!(11.5) }
        );
    }

    #[test]
    fn test_dual_holder_split() {
        let value = json!({
            "schema_version": 4,
            "products": [{"id": "scpi", "label": "SCPI", "holders": "pp_pm", "rulesets": []}]
        });
        let catalog = migrate_catalog(value).unwrap();
        let ids: Vec<_> = catalog.products.iter().map(|p| (p.id.as_str(), p.holders)).collect();
        assert_eq!(ids, vec![("scpi_pp", Holders::Pp), ("scpi_pm", Holders::Pm)]);
        assert_eq!(catalog.products[1].label, "SCPI (PM)");
    }

    #[test]
    fn test_stored_latest_catalog_sorted_on_load() {
        let value = json!({
            "schema_version": 5,
            "products": [{"id": "cto", "rulesets": [
                {"effective_date": "2013-01-01"},
                {"effective_date": "2018-01-01"}
            ]}]
        });
        let catalog = load_catalog(value).unwrap();
        let dates: Vec<_> = catalog.products[0]
            .rulesets
            .iter()
            .map(|r| r.effective_date.to_string())
            .collect();
        assert_eq!(dates, vec!["2018-01-01", "2013-01-01"]);
    }

    #[test]
    fn test_migrate_to_latest_idempotent() {
        let once = migrate_to_latest(v1_catalog());
        let twice = migrate_to_latest(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_shapes_unchanged() {
        let odd = json!({"hello": "world"});
        assert_eq!(migrate_to_latest(odd.clone()), odd);
        let future = json!({"schema_version": 9, "products": []});
        assert_eq!(migrate_to_latest(future.clone()), future);
        let broken = json!({"schema_version": 2, "products": [{"no_id": true}]});
        assert_eq!(migrate_to_latest(broken.clone()), broken);
        assert!(migrate_catalog(broken).is_err());
    }

    #[test]
    fn test_load_catalog() {
        let catalog = load_catalog(v1_catalog()).unwrap();
        assert_eq!(catalog.schema_version, LATEST_SCHEMA_VERSION);
        assert!(load_catalog(json!({"hello": "world"})).is_err());
    }
}
