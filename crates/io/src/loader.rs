// Source loading: the collaborator seam between disk and the engine

use std::fs;
use std::path::Path;

use geofuse_config::Settings;
use geofuse_core::{GeoTable, Table};
use geofuse_recon::model::{DiagnosticKind, Diagnostics, Stage};
use geofuse_recon::{FusionInput, InputFingerprint, ResultPayload, ResultTable};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::boundary::read_boundaries;
use crate::csv::{read_file_as_utf8, read_table};
use crate::discover::{discover, DiscoveredInputs};
use crate::error::IoError;

/// Supplies the raw inputs of one run.
pub trait SourceLoader {
    fn load_tabular(&self) -> Result<Option<Table>, IoError>;
    fn load_boundaries(&self) -> Result<Option<GeoTable>, IoError>;
    /// One entry per result source, so a bad file can be skipped on its own.
    fn load_results(&self) -> Vec<Result<ResultTable, IoError>>;

    /// Content hashes of the files behind the inputs.
    fn fingerprints(&self) -> Result<Vec<InputFingerprint>, IoError> {
        Ok(Vec::new())
    }
}

/// Load every input into a [`FusionInput`].
///
/// Only the tabular source is fatal. An unreadable boundary file leaves the
/// run without geometry and an unreadable result file is skipped; both add
/// an `InvalidInput` diagnostic.
pub fn load_input(loader: &dyn SourceLoader, diags: &mut Diagnostics) -> Result<FusionInput, IoError> {
    let tabular = loader.load_tabular()?;

    let boundaries = loader.load_boundaries().unwrap_or_else(|e| {
        diags.push(
            Stage::Load,
            DiagnosticKind::InvalidInput,
            format!("boundary data skipped: {e}"),
        );
        None
    });

    let mut results = Vec::new();
    for loaded in loader.load_results() {
        match loaded {
            Ok(table) => results.push(table),
            Err(e) => diags.push(
                Stage::Load,
                DiagnosticKind::InvalidInput,
                format!("result table skipped: {e}"),
            ),
        }
    }

    Ok(FusionInput {
        tabular,
        boundaries,
        results,
    })
}

// ---------------------------------------------------------------------------
// Session directory
// ---------------------------------------------------------------------------

/// Reads inputs located by [`discover`] in one session directory.
#[derive(Debug, Clone)]
pub struct SessionDirLoader {
    inputs: DiscoveredInputs,
}

impl SessionDirLoader {
    pub fn new(inputs: DiscoveredInputs) -> Self {
        Self { inputs }
    }

    pub fn discover(dir: &Path, settings: &Settings, methods: &[String]) -> Result<Self, IoError> {
        let inputs = discover(dir, &settings.inputs, methods, &settings.outputs)?;
        info!(
            dir = %dir.display(),
            tabular = inputs.tabular.is_some(),
            boundaries = inputs.boundaries.is_some(),
            results = inputs.results.len(),
            "inputs discovered"
        );
        Ok(Self::new(inputs))
    }
}

impl SourceLoader for SessionDirLoader {
    fn load_tabular(&self) -> Result<Option<Table>, IoError> {
        self.inputs.tabular.as_deref().map(read_table).transpose()
    }

    fn load_boundaries(&self) -> Result<Option<GeoTable>, IoError> {
        self.inputs.boundaries.as_deref().map(read_boundaries).transpose()
    }

    fn load_results(&self) -> Vec<Result<ResultTable, IoError>> {
        self.inputs
            .results
            .iter()
            .map(|(method, path)| read_result(method, path))
            .collect()
    }

    fn fingerprints(&self) -> Result<Vec<InputFingerprint>, IoError> {
        let mut out = Vec::new();
        if let Some(path) = &self.inputs.tabular {
            out.push(fingerprint("tabular", path)?);
        }
        if let Some(path) = &self.inputs.boundaries {
            out.push(fingerprint("boundary", path)?);
        }
        for (method, path) in &self.inputs.results {
            out.push(fingerprint(&format!("result:{method}"), path)?);
        }
        Ok(out)
    }
}

/// Read one result file: `.json` through the payload adapter, anything
/// else as delimited text.
pub fn read_result(method: &str, path: &Path) -> Result<ResultTable, IoError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let payload = if is_json {
        let text = read_file_as_utf8(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| IoError::format(path, format!("invalid JSON: {e}")))?;
        ResultPayload::from_json(&value).map_err(|e| IoError::format(path, e.to_string()))?
    } else {
        ResultPayload::Table(read_table(path)?)
    };
    debug!(method, path = %path.display(), "result table read");
    Ok(ResultTable::new(method, payload).with_origin(path.display().to_string()))
}

/// SHA-256 of the file bytes, lowercase hex.
pub fn fingerprint(category: &str, path: &Path) -> Result<InputFingerprint, IoError> {
    let bytes = fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(InputFingerprint {
        category: category.to_string(),
        path: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256: format!("{:x}", hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofuse_core::Value;
    use tempfile::tempdir;

    #[test]
    fn loads_discovered_session() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("survey.csv"), "ward,tpr\nKawo,0.3\n").unwrap();
        fs::write(dir.path().join("pca_ranks.json"), r#"["Gwale", "Kawo"]"#).unwrap();
        fs::write(dir.path().join("composite.csv"), "ward;score\nKawo;0.9\n").unwrap();

        let methods = vec!["composite".to_string(), "pca".to_string()];
        let loader = SessionDirLoader::discover(dir.path(), &Settings::default(), &methods).unwrap();
        let mut diags = Diagnostics::new();
        let input = load_input(&loader, &mut diags).unwrap();
        assert!(diags.is_empty());

        assert_eq!(input.tabular.as_ref().map(|t| t.len()), Some(1));
        assert!(input.boundaries.is_none());
        assert_eq!(input.results.len(), 2);
        assert_eq!(input.results[0].method, "composite");
        let pca = input.results[1].payload.clone().into_table();
        assert_eq!(pca.columns, vec!["name", "rank"]);
        assert_eq!(pca.get(1, 1), &Value::Int(2));

        let prints = loader.fingerprints().unwrap();
        assert_eq!(prints.len(), 3);
        assert_eq!(prints[0].category, "tabular");
        assert_eq!(prints[0].sha256.len(), 64);
        assert_eq!(prints[2].category, "result:pca");
    }

    #[test]
    fn fingerprint_of_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, b"").unwrap();
        let fp = fingerprint("tabular", &path).unwrap();
        assert_eq!(fp.sha256, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        assert_eq!(fp.path, "empty.csv");
    }

    #[test]
    fn unreadable_optional_inputs_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("survey.csv"), "ward,tpr\nKawo,0.3\n").unwrap();
        fs::write(dir.path().join("wards.geojson"), "{ not json").unwrap();
        fs::write(dir.path().join("pca_rankings.json"), r#"[1, {"a": 2}]"#).unwrap();
        fs::write(dir.path().join("composite.csv"), "ward,rank\nKawo,1\n").unwrap();

        let methods = vec!["composite".to_string(), "pca".to_string()];
        let loader = SessionDirLoader::discover(dir.path(), &Settings::default(), &methods).unwrap();
        let mut diags = Diagnostics::new();
        let input = load_input(&loader, &mut diags).unwrap();

        assert!(input.tabular.is_some());
        assert!(input.boundaries.is_none());
        assert_eq!(input.results.len(), 1);
        assert_eq!(input.results[0].method, "composite");
        assert_eq!(diags.count(DiagnosticKind::InvalidInput), 2);
    }

    #[test]
    fn unreadable_tabular_stays_fatal() {
        let dir = tempdir().unwrap();
        let loader = SessionDirLoader::new(DiscoveredInputs {
            tabular: Some(dir.path().join("missing.csv")),
            ..Default::default()
        });
        let mut diags = Diagnostics::new();
        assert!(load_input(&loader, &mut diags).is_err());
    }

    #[test]
    fn bad_result_json_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pca.json");
        fs::write(&path, r#"[1, {"a": 2}]"#).unwrap();
        assert!(matches!(read_result("pca", &path), Err(IoError::Format { .. })));
    }
}
