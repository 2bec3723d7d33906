//! `geofuse-recon` - identity reconciliation and result-table fusion engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns the fused dataset
//! plus diagnostics. No filesystem access.

pub mod categories;
pub mod columns;
pub mod config;
pub mod derived;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod identity;
pub mod matcher;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod payload;
pub mod scorer;
pub mod validate;

pub use categories::CategoryRules;
pub use config::FusionConfig;
pub use engine::run;
pub use error::FusionError;
pub use metadata::{InputFingerprint, MetadataSummary};
pub use model::{Diagnostic, DiagnosticKind, Diagnostics, FusionInput, FusionOutput, Stage, StageFailure};
pub use payload::{ResultPayload, ResultTable};
