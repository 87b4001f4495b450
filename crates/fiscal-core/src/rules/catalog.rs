use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::brackets::TaxBracket;
use crate::error::FiscalError;
use crate::FiscalResult;

/// Schema version written by the current code.
pub const LATEST_SCHEMA_VERSION: u32 = 5;

const REF_PREFIX: &str = "$ref:";

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Settings object a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsTable {
    TaxSettings,
    PsSettings,
}

impl SettingsTable {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingsTable::TaxSettings => "tax_settings",
            SettingsTable::PsSettings => "ps_settings",
        }
    }
}

/// Pointer from a ruleset field into a settings table, persisted as
/// `$ref:<table>.<dot.path>`. Only the pointer is stored; the value is
/// resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleRef {
    pub table: SettingsTable,
    pub path: Vec<String>,
}

impl RuleRef {
    pub fn new(table: SettingsTable, path: &[&str]) -> Self {
        Self {
            table,
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn path_segments(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

impl FromStr for RuleRef {
    type Err = FiscalError;

    fn from_str(raw: &str) -> FiscalResult<Self> {
        let invalid = |reason: &str| FiscalError::InvalidReference {
            reference: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix(REF_PREFIX)
            .ok_or_else(|| invalid("missing '$ref:' prefix"))?;
        let mut segments = body.split('.');
        let table = match segments.next() {
            Some("tax_settings") => SettingsTable::TaxSettings,
            Some("ps_settings") => SettingsTable::PsSettings,
            _ => return Err(invalid("unknown settings table")),
        };
        let path: Vec<String> = segments.map(str::to_string).collect();
        if path.is_empty() || path.iter().any(String::is_empty) {
            return Err(invalid("empty path segment"));
        }
        Ok(RuleRef { table, path })
    }
}

impl TryFrom<String> for RuleRef {
    type Error = FiscalError;

    fn try_from(raw: String) -> FiscalResult<Self> {
        raw.parse()
    }
}

impl From<RuleRef> for String {
    fn from(r: RuleRef) -> String {
        r.to_string()
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REF_PREFIX}{}.{}", self.table.as_str(), self.path.join("."))
    }
}

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

/// A governed field in a rule block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDef {
    Number { value: Decimal },
    Boolean { value: bool },
    Enum { value: String, options: Vec<String> },
    Brackets { value: Vec<TaxBracket> },
    Ref { value: RuleRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Constitution,
    Sortie,
    Deces,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Constitution, Phase::Sortie, Phase::Deces];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub constitution: Vec<Block>,
    #[serde(default)]
    pub sortie: Vec<Block>,
    #[serde(default)]
    pub deces: Vec<Block>,
}

impl Phases {
    pub fn get(&self, phase: Phase) -> &[Block] {
        match phase {
            Phase::Constitution => &self.constitution,
            Phase::Sortie => &self.sortie,
            Phase::Deces => &self.deces,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut Vec<Block> {
        match phase {
            Phase::Constitution => &mut self.constitution,
            Phase::Sortie => &mut self.sortie,
            Phase::Deces => &mut self.deces,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub phases: Phases,
}

impl Ruleset {
    /// First definition of `field` among the phase's blocks.
    pub fn field(&self, phase: Phase, field: &str) -> Option<&FieldDef> {
        self.phases
            .get(phase)
            .iter()
            .find_map(|block| block.fields.get(field))
    }
}

/// Who may hold the product: natural persons, legal entities or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holders {
    #[default]
    Pp,
    Pm,
    PpPm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub holders: Holders,
    /// Sorted by effective date, most recent first.
    #[serde(default)]
    pub rulesets: Vec<Ruleset>,
}

fn default_active() -> bool {
    true
}

impl Product {
    pub fn sort_rulesets(&mut self) {
        self.rulesets
            .sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
    }

    /// Index of the latest ruleset effective on or before `target` (any date
    /// when `None`). Earlier entries win ties. Does not rely on the list
    /// being sorted.
    fn in_force_index(&self, target: Option<NaiveDate>) -> Option<usize> {
        self.rulesets
            .iter()
            .enumerate()
            .filter(|(_, r)| target.map_or(true, |date| r.effective_date <= date))
            .reduce(|best, next| {
                if next.1.effective_date > best.1.effective_date {
                    next
                } else {
                    best
                }
            })
            .map(|(i, _)| i)
    }

    /// Ruleset in force at `target`: the most recent one whose effective date
    /// is not after it. Without a target date, the current version.
    pub fn select_ruleset(&self, target: Option<NaiveDate>) -> Option<&Ruleset> {
        self.in_force_index(target).map(|i| &self.rulesets[i])
    }

    /// Only the current version may be edited in place.
    pub fn current_ruleset_mut(&mut self) -> Option<&mut Ruleset> {
        let i = self.in_force_index(None)?;
        self.rulesets.get_mut(i)
    }

    /// Open a new version effective at `effective_date`, cloned from the
    /// current one. The new date must be strictly after the current version's.
    pub fn create_version(&mut self, effective_date: NaiveDate) -> FiscalResult<&Ruleset> {
        let current = self
            .select_ruleset(None)
            .ok_or_else(|| FiscalError::VersionConflict {
                product: self.id.clone(),
                reason: "no existing ruleset to derive from".into(),
            })?;
        if effective_date <= current.effective_date {
            return Err(FiscalError::VersionConflict {
                product: self.id.clone(),
                reason: format!(
                    "new version date {effective_date} must be after {}",
                    current.effective_date
                ),
            });
        }
        let mut next = current.clone();
        next.effective_date = effective_date;
        self.rulesets.insert(0, next);
        Ok(&self.rulesets[0])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub schema_version: u32,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self {
            schema_version: LATEST_SCHEMA_VERSION,
            products: Vec::new(),
        }
    }
}

impl ProductCatalog {
    /// Active product with the given id.
    pub fn active_product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.active && p.id == id)
    }

    pub fn product_mut(&mut self, id: &str) -> Option<&mut Product> {
        self.products.iter_mut().find(|p| p.id == id)
    }
}
