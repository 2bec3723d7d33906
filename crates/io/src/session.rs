// Session runs and the per-session outcome cache

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use geofuse_config::Settings;
use geofuse_recon::{
    run, CategoryRules, Diagnostics, FusionConfig, FusionError, MetadataSummary, Stage, StageFailure,
};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::error::IoError;
use crate::loader::{load_input, SessionDirLoader, SourceLoader};
use crate::persist::{persist, PersistOptions, PersistReport};

/// What a successful run hands back.
#[derive(Debug, Clone, Serialize)]
pub struct FusionReport {
    pub session_id: String,
    pub metadata: MetadataSummary,
    pub persisted: PersistReport,
}

/// Every run ends in exactly one of these; errors never escape raw.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success(FusionReport),
    Failure(StageFailure),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            RunOutcome::Failure(f) => Some(f),
            RunOutcome::Success(_) => None,
        }
    }

    pub fn report(&self) -> Option<&FusionReport> {
        match self {
            RunOutcome::Success(r) => Some(r),
            RunOutcome::Failure(_) => None,
        }
    }
}

/// Session ids name a single directory under the sessions root.
pub fn validate_session_id(id: &str) -> Result<(), FusionError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id != "."
        && id != ".."
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(FusionError::MissingInput(format!("invalid session id '{id}'")))
    }
}

/// Load the optional fusion-config and category-rules files named in settings.
pub fn load_engine_config(settings: &Settings) -> Result<(FusionConfig, CategoryRules), FusionError> {
    let read = |path: &Path| {
        fs::read_to_string(path).map_err(|e| FusionError::Io(format!("{}: {e}", path.display())))
    };
    let config = match &settings.fusion_config {
        Some(path) => FusionConfig::from_toml(&read(path)?)?,
        None => FusionConfig::default(),
    };
    let rules = match &settings.category_rules {
        Some(path) => CategoryRules::from_toml(&read(path)?)?,
        None => CategoryRules::default(),
    };
    Ok((config, rules))
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs load → fuse → persist for one session directory.
#[derive(Debug, Clone)]
pub struct SessionRunner {
    settings: Settings,
    config: FusionConfig,
    rules: CategoryRules,
    /// Fixed timestamp for reproducible output; `None` means now.
    generated_at: Option<String>,
}

impl SessionRunner {
    pub fn new(settings: Settings, config: FusionConfig, rules: CategoryRules) -> Self {
        Self {
            settings,
            config,
            rules,
            generated_at: None,
        }
    }

    pub fn with_generated_at(mut self, timestamp: impl Into<String>) -> Self {
        self.generated_at = Some(timestamp.into());
        self
    }

    /// Run the session stored under the configured sessions root.
    pub fn run(&self, session_id: &str) -> RunOutcome {
        if let Err(e) = validate_session_id(session_id) {
            return RunOutcome::Failure(StageFailure::new(Stage::Load, &e));
        }
        self.run_in(session_id, &self.settings.session_dir(session_id))
    }

    /// Run against an explicit directory; outputs are written next to the inputs.
    pub fn run_in(&self, session_id: &str, dir: &Path) -> RunOutcome {
        let _span = info_span!("session", id = session_id).entered();
        let loader = match SessionDirLoader::discover(dir, &self.settings, &self.config.results.methods) {
            Ok(loader) => loader,
            Err(e) => return load_failure(e),
        };
        self.run_with(session_id, &loader, dir)
    }

    pub fn run_with(&self, session_id: &str, loader: &dyn SourceLoader, out_dir: &Path) -> RunOutcome {
        let mut load_diags = Diagnostics::new();
        let input = match load_input(loader, &mut load_diags) {
            Ok(input) => input,
            Err(e) => return load_failure(e),
        };
        let fingerprints = match loader.fingerprints() {
            Ok(f) => f,
            Err(e) => return load_failure(e),
        };

        let mut output = match run(&self.config, input) {
            Ok(output) => output,
            Err(failure) => {
                warn!(stage = %failure.stage, code = %failure.code, "run failed: {}", failure.message);
                return RunOutcome::Failure(failure);
            }
        };

        load_diags.append(std::mem::take(&mut output.diagnostics));
        output.diagnostics = load_diags;

        let generated_at = self
            .generated_at
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        let dataset = &output.dataset;
        let meta = BTreeMap::from([
            ("session_id".to_string(), session_id.to_string()),
            ("generated_at".to_string(), generated_at.clone()),
            ("engine_version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("row_count".to_string(), dataset.len().to_string()),
            ("column_count".to_string(), dataset.output_columns().len().to_string()),
            ("name_column".to_string(), dataset.name_column.clone().unwrap_or_default()),
            ("code_column".to_string(), dataset.code_column.clone().unwrap_or_default()),
            ("inputs".to_string(), serde_json::to_string(&fingerprints).unwrap_or_default()),
        ]);

        let options = PersistOptions::from_settings(&self.settings);
        let persisted = match persist(&output.dataset, out_dir, &meta, &options, &mut output.diagnostics) {
            Ok(report) => report,
            Err(e) => {
                let failure = StageFailure::new(Stage::Persistence, &e);
                warn!(code = %failure.code, "persistence failed: {}", failure.message);
                return RunOutcome::Failure(failure);
            }
        };

        let metadata = MetadataSummary::build(&output, &self.rules, session_id, &generated_at, fingerprints);
        info!(
            rows = metadata.row_count,
            columns = metadata.column_count,
            warnings = metadata.warnings.len(),
            "session complete"
        );
        RunOutcome::Success(FusionReport {
            session_id: session_id.to_string(),
            metadata,
            persisted,
        })
    }
}

fn load_failure(e: IoError) -> RunOutcome {
    let err = FusionError::from(e);
    warn!(code = err.code(), "loading inputs failed: {err}");
    RunOutcome::Failure(StageFailure::new(Stage::Load, &err))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Outcome cache keyed by session id.
///
/// Failures are cached like successes; `reload` is the only way to rerun.
#[derive(Debug)]
pub struct SessionStore {
    runner: SessionRunner,
    outcomes: HashMap<String, Arc<RunOutcome>>,
}

impl SessionStore {
    pub fn new(runner: SessionRunner) -> Self {
        Self {
            runner,
            outcomes: HashMap::new(),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<RunOutcome>> {
        self.outcomes.get(session_id).cloned()
    }

    pub fn get_or_run(&mut self, session_id: &str) -> Arc<RunOutcome> {
        if let Some(outcome) = self.outcomes.get(session_id) {
            return Arc::clone(outcome);
        }
        self.reload(session_id)
    }

    /// Drop any cached outcome and run again.
    pub fn reload(&mut self, session_id: &str) -> Arc<RunOutcome> {
        let outcome = Arc::new(self.runner.run(session_id));
        self.outcomes.insert(session_id.to_string(), Arc::clone(&outcome));
        outcome
    }

    pub fn evict(&mut self, session_id: &str) -> bool {
        self.outcomes.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
