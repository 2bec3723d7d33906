use std::path::PathBuf;

use geofuse_recon::FusionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File was readable but its content is not what the format requires.
    #[error("{path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("session directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl IoError {
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<IoError> for FusionError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Format { .. } => FusionError::Parse(e.to_string()),
            IoError::MissingDirectory(_) => FusionError::MissingInput(e.to_string()),
            _ => FusionError::Io(e.to_string()),
        }
    }
}
