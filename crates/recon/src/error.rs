use thiserror::Error;

use crate::model::DiagnosticKind;

/// Every failure the fusion pipeline can name.
///
/// Fatal variants abort the run; the rest are absorbed into a
/// [`crate::model::Diagnostic`] and the run continues on its degraded path.
#[derive(Debug, Error)]
pub enum FusionError {
    /// Required tabular source absent.
    #[error("missing required input: {0}")]
    MissingInput(String),

    /// No identifiable name column in a source.
    #[error("{source_name}: no identifiable name column; join skipped")]
    JoinKeyNotFound { source_name: String },

    /// Best fuzzy candidate scored below the acceptance threshold.
    #[error("'{name}': best candidate '{candidate}' scored {score:.3} via {scorer}, below threshold {threshold:.2}")]
    LowConfidenceMatchSkipped {
        name: String,
        candidate: String,
        scorer: String,
        score: f64,
        threshold: f64,
    },

    /// Fatal structural/completeness issue found by the validator.
    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailure(Vec<String>),

    /// Primary output still missing after the visibility retries.
    #[error("primary output '{path}' not visible after {attempts} attempts")]
    PersistenceVisibility { path: String, attempts: u32 },

    /// Secondary (backup) format could not be written.
    #[error("backup write failed ({format}): {message}")]
    BackupWriteFailure { format: String, message: String },

    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad threshold, unordered bands, ...).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// Malformed input payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// IO error (file read/write, database).
    #[error("IO error: {0}")]
    Io(String),
}

impl FusionError {
    /// Whether this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        self.diagnostic_kind().is_none()
    }

    /// Diagnostic kind for the non-fatal variants.
    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            Self::JoinKeyNotFound { .. } => Some(DiagnosticKind::JoinKeyNotFound),
            Self::LowConfidenceMatchSkipped { .. } => Some(DiagnosticKind::LowConfidenceMatchSkipped),
            Self::BackupWriteFailure { .. } => Some(DiagnosticKind::BackupWriteFailure),
            _ => None,
        }
    }

    /// Stable snake_case identifier, used in failure results and exit-code mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::JoinKeyNotFound { .. } => "join_key_not_found",
            Self::LowConfidenceMatchSkipped { .. } => "low_confidence_match_skipped",
            Self::ValidationFailure(_) => "validation_failure",
            Self::PersistenceVisibility { .. } => "persistence_visibility",
            Self::BackupWriteFailure { .. } => "backup_write_failure",
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigValidation(_) => "config_validation",
            Self::Parse(_) => "parse",
            Self::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for FusionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
