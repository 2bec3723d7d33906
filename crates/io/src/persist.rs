// Primary + backup writes with visibility check

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use geofuse_config::{OutputNames, Settings};
use geofuse_core::FusedDataset;
use geofuse_recon::model::{Diagnostics, Stage};
use geofuse_recon::FusionError;
use serde::Serialize;
use tracing::{debug, info};

use crate::{csv, gpkg, json};

#[derive(Debug, Clone)]
pub struct PersistOptions {
    pub outputs: OutputNames,
    pub visibility_attempts: u32,
    pub visibility_delay: Duration,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PersistOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            outputs: settings.outputs.clone(),
            visibility_attempts: settings.persistence.visibility_attempts,
            visibility_delay: Duration::from_millis(settings.persistence.visibility_delay_ms),
        }
    }
}

/// Files actually written by [`persist`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistReport {
    pub primary: PathBuf,
    pub backups: Vec<PathBuf>,
}

/// Write the GeoPackage, confirm it is visible, then the CSV and JSON backups.
///
/// A failed or invisible primary is fatal and nothing else is written.
/// Backup failures only add a `BackupWriteFailure` diagnostic.
pub fn persist(
    dataset: &FusedDataset,
    dir: &Path,
    meta: &BTreeMap<String, String>,
    options: &PersistOptions,
    diags: &mut Diagnostics,
) -> Result<PersistReport, FusionError> {
    let primary = dir.join(&options.outputs.primary);
    gpkg::write(dataset, &primary, meta)?;
    wait_until_visible(&primary, options.visibility_attempts, options.visibility_delay)?;

    let mut backups = Vec::new();
    let csv_path = dir.join(&options.outputs.csv);
    let json_path = dir.join(&options.outputs.json);
    let attempts = [
        ("csv", csv_path.clone(), csv::write_csv(dataset, &csv_path)),
        ("json", json_path.clone(), json::write_snapshot(dataset, &json_path)),
    ];
    for (format, path, result) in attempts {
        match result {
            Ok(()) => backups.push(path),
            Err(e) => {
                let err = FusionError::BackupWriteFailure {
                    format: format.to_string(),
                    message: e.to_string(),
                };
                diags.absorb(Stage::Persistence, err)?;
            }
        }
    }

    info!(path = %primary.display(), backups = backups.len(), "dataset persisted");
    Ok(PersistReport { primary, backups })
}

/// Re-check that `path` exists, sleeping `delay` between attempts.
pub fn wait_until_visible(path: &Path, attempts: u32, delay: Duration) -> Result<(), FusionError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if path.exists() {
            return Ok(());
        }
        debug!(path = %path.display(), attempt, "output not visible yet");
        if attempt < attempts {
            thread::sleep(delay);
        }
    }
    Err(FusionError::PersistenceVisibility {
        path: path.display().to_string(),
        attempts,
    })
}
