use std::fmt;

use geofuse_core::{FusedDataset, GeoTable, Table};
use serde::Serialize;
use tracing::warn;

use crate::derived::DerivedSummary;
use crate::error::FusionError;
use crate::payload::ResultTable;
use crate::validate::ValidationReport;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything one run consumes, already loaded from disk.
#[derive(Debug, Default)]
pub struct FusionInput {
    pub tabular: Option<Table>,
    pub boundaries: Option<GeoTable>,
    pub results: Vec<ResultTable>,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Duplicates,
    Identity,
    Results,
    Derived,
    Validation,
    Persistence,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Duplicates => "duplicates",
            Stage::Identity => "identity",
            Stage::Results => "results",
            Stage::Derived => "derived",
            Stage::Validation => "validation",
            Stage::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Diagnostics (non-fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    JoinKeyNotFound,
    LowConfidenceMatchSkipped,
    DuplicateNamesRemain,
    UnmatchedResultRows,
    DuplicateResultKeys,
    EmptyResultTable,
    MissingOptionalInput,
    InvalidInput,
    ValidationWarning,
    BackupWriteFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Collected warnings of one run. Every push is also logged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        warn!(stage = %stage, kind = ?kind, "{message}");
        self.0.push(Diagnostic { stage, kind, message });
    }

    /// Absorb a non-fatal error. Fatal errors are handed back unchanged.
    pub fn absorb(&mut self, stage: Stage, err: FusionError) -> Result<(), FusionError> {
        match err.diagnostic_kind() {
            Some(kind) => {
                self.push(stage, kind, err.to_string());
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Move every entry of `other` to the end, without logging them again.
    pub fn append(&mut self, mut other: Diagnostics) {
        self.0.append(&mut other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// Structured failure handed to the caller instead of a raw error.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// Stable error identifier (`FusionError::code`).
    pub code: String,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, err: &FusionError) -> Self {
        Self {
            stage,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Identity-matching counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchStats {
    pub tabular_rows: usize,
    pub boundary_rows: usize,
    pub matched_by_code: usize,
    pub matched_exact: usize,
    pub matched_fuzzy: usize,
    pub tabular_only: usize,
    pub boundary_only: usize,
    pub low_confidence_skipped: usize,
}

impl MatchStats {
    pub fn matched(&self) -> usize {
        self.matched_by_code + self.matched_exact + self.matched_fuzzy
    }
}

/// Outcome of merging one result table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultMergeStats {
    pub method: String,
    pub rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_keys: usize,
    pub columns_added: Vec<String>,
    /// Standardized rank column, when the table had one.
    pub rank_column: Option<String>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FusionOutput {
    pub dataset: FusedDataset,
    pub matching: MatchStats,
    pub results: Vec<ResultMergeStats>,
    pub derived: DerivedSummary,
    pub validation: ValidationReport,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_non_fatal() {
        let mut d = Diagnostics::new();
        d.absorb(Stage::Results, FusionError::JoinKeyNotFound { source_name: "pca".into() })
            .unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.count(DiagnosticKind::JoinKeyNotFound), 1);
    }

    #[test]
    fn absorb_returns_fatal() {
        let mut d = Diagnostics::new();
        let err = d
            .absorb(Stage::Load, FusionError::MissingInput("tabular".into()))
            .unwrap_err();
        assert!(matches!(err, FusionError::MissingInput(_)));
        assert!(d.is_empty());
    }

    #[test]
    fn append_keeps_order() {
        let mut load = Diagnostics::new();
        load.push(Stage::Load, DiagnosticKind::InvalidInput, "bad pca file");
        let mut engine = Diagnostics::new();
        engine.push(Stage::Results, DiagnosticKind::EmptyResultTable, "empty");
        load.append(engine);
        let stages: Vec<Stage> = load.iter().map(|d| d.stage).collect();
        assert_eq!(stages, vec![Stage::Load, Stage::Results]);
    }

    #[test]
    fn stage_failure_display() {
        let f = StageFailure::new(Stage::Validation, &FusionError::ValidationFailure(vec!["no records".into()]));
        assert_eq!(f.code, "validation_failure");
        assert_eq!(f.to_string(), "[validation] validation failed: no records");
    }
}
