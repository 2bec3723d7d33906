//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success (warnings may still have been reported)           |
//! | 1    | General error (unspecified)                               |
//! | 2    | CLI usage error (bad args, bad session id)                |
//! | 3    | Required input missing or unreadable                      |
//! | 4    | Fused dataset failed validation; nothing was written      |
//! | 5    | Primary output could not be written or is not visible     |
//! | 6    | Settings / fusion config / category rules invalid         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `failure_exit_code` if a run failure can produce it

use geofuse_recon::{Stage, StageFailure};

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed session id.
pub const EXIT_USAGE: u8 = 2;

/// Tabular input absent, session directory missing, or an input file
/// could not be parsed.
pub const EXIT_MISSING_INPUT: u8 = 3;

/// Validation rejected the fused dataset.
pub const EXIT_VALIDATION: u8 = 4;

/// Primary GeoPackage write failed or never became visible.
pub const EXIT_PERSISTENCE: u8 = 5;

/// Configuration could not be loaded or failed validation.
pub const EXIT_CONFIG: u8 = 6;

/// Map a run failure to its exit code.
pub fn failure_exit_code(failure: &StageFailure) -> u8 {
    match failure.code.as_str() {
        "missing_input" | "parse" => EXIT_MISSING_INPUT,
        "validation_failure" => EXIT_VALIDATION,
        "persistence_visibility" => EXIT_PERSISTENCE,
        "config_parse" | "config_validation" => EXIT_CONFIG,
        _ if failure.stage == Stage::Persistence => EXIT_PERSISTENCE,
        _ if failure.stage == Stage::Load => EXIT_MISSING_INPUT,
        _ => EXIT_ERROR,
    }
}
