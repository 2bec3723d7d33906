use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::geometry::Geometry;
use crate::value::Value;

static NULL_VALUE: Value = Value::Null;

/// Output column holding `EntityRecord::primary_name`.
pub const NAME_COLUMN: &str = "unit_name";
/// Output column holding `EntityRecord::secondary_code`.
pub const CODE_COLUMN: &str = "unit_code";
/// Match annotation columns, in output order.
pub const MATCH_COLUMNS: [&str; 4] = ["matched", "match_method", "match_confidence", "match_scorer"];

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Which input contributed data to a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Tabular,
    Boundary,
    Result(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tabular => write!(f, "tabular"),
            Self::Boundary => write!(f, "boundary"),
            Self::Result(method) => write!(f, "result:{method}"),
        }
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Match annotation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Code,
    Exact,
    Fuzzy,
    #[default]
    None,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Code => "code",
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::None => "none",
        }
    }
}

/// How a record's tabular and boundary sides were joined.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MatchAnnotation {
    pub method: MatchMethod,
    pub confidence: Option<f64>,
    /// Winning scorer for fuzzy matches.
    pub scorer: Option<String>,
}

impl MatchAnnotation {
    pub fn matched(&self) -> bool {
        self.method != MatchMethod::None
    }
}

// ---------------------------------------------------------------------------
// Entity record
// ---------------------------------------------------------------------------

/// One administrative unit after fusion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityRecord {
    pub primary_name: String,
    pub secondary_code: Option<String>,
    pub geometry: Option<Geometry>,
    pub attributes: HashMap<String, Value>,
    pub provenance: BTreeSet<Source>,
    #[serde(rename = "match")]
    pub match_info: MatchAnnotation,
}

impl EntityRecord {
    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL_VALUE)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.attributes.insert(column.into(), value);
    }

    /// Resolve any output column, including the identity and match columns.
    pub fn cell(&self, column: &str) -> Value {
        match column {
            NAME_COLUMN => Value::Text(self.primary_name.clone()),
            CODE_COLUMN => self
                .secondary_code
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            "matched" => Value::Bool(self.match_info.matched()),
            "match_method" => Value::Text(self.match_info.method.as_str().to_string()),
            "match_confidence" => self.match_info.confidence.map(Value::Float).unwrap_or(Value::Null),
            "match_scorer" => self
                .match_info
                .scorer
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            other => self.get(other).clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// The fused record set plus its deterministic column order.
///
/// `columns` lists attribute columns only; the identity and match columns
/// are fixed and prepended/appended by [`FusedDataset::output_columns`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FusedDataset {
    pub records: Vec<EntityRecord>,
    pub columns: Vec<String>,
    /// Source column the primary names were read from (tabular side).
    pub name_column: Option<String>,
    /// Source column the secondary codes were read from (tabular side).
    pub code_column: Option<String>,
}

impl FusedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names compare case-insensitively, as they do in SQLite.
    pub fn has_column(&self, name: &str) -> bool {
        is_reserved_column(name) || self.columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Register a new attribute column and return the name actually used.
    ///
    /// When `wanted` is taken, `{wanted}_{suffix}` is tried, then
    /// `{wanted}_{suffix}_2`, `_3`, ...
    pub fn add_column(&mut self, wanted: &str, suffix: &str) -> String {
        let name = self.free_column_name(wanted, suffix);
        self.columns.push(name.clone());
        name
    }

    pub fn free_column_name(&self, wanted: &str, suffix: &str) -> String {
        if !self.has_column(wanted) {
            return wanted.to_string();
        }
        let base = format!("{wanted}_{suffix}");
        if !self.has_column(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.has_column(candidate))
            .unwrap_or(base)
    }

    /// Every output column (geometry excluded) in order.
    pub fn output_columns(&self) -> Vec<String> {
        let mut out = vec![NAME_COLUMN.to_string(), CODE_COLUMN.to_string()];
        out.extend(self.columns.iter().cloned());
        out.extend(MATCH_COLUMNS.iter().map(|c| c.to_string()));
        out
    }

    pub fn records_with_geometry(&self) -> usize {
        self.records.iter().filter(|r| r.geometry.is_some()).count()
    }
}

pub fn is_reserved_column(name: &str) -> bool {
    [NAME_COLUMN, CODE_COLUMN]
        .iter()
        .chain(MATCH_COLUMNS.iter())
        .any(|c| c.eq_ignore_ascii_case(name))
}
