// Input discovery inside a session directory

use std::fs;
use std::path::{Path, PathBuf};

use geofuse_config::{InputPatterns, OutputNames};
use tracing::{debug, warn};

use crate::error::IoError;

/// Input files found for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredInputs {
    pub tabular: Option<PathBuf>,
    pub boundaries: Option<PathBuf>,
    /// `(method, path)` in method order.
    pub results: Vec<(String, PathBuf)>,
}

impl DiscoveredInputs {
    pub fn is_empty(&self) -> bool {
        self.tabular.is_none() && self.boundaries.is_none() && self.results.is_empty()
    }
}

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Locate inputs by basename glob.
///
/// Each file is claimed at most once. Result methods claim first (their
/// patterns are the most specific), then boundaries, then tabular, so a
/// broad `*.csv` tabular pattern never swallows `pca_rankings.csv`.
/// Within a category, patterns are tried in order and the first matching
/// file (by name) wins. Output files and hidden/temporary files are ignored.
pub fn discover(
    dir: &Path,
    patterns: &InputPatterns,
    methods: &[String],
    outputs: &OutputNames,
) -> Result<DiscoveredInputs, IoError> {
    if !dir.is_dir() {
        return Err(IoError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|source| IoError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IoError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let is_output = outputs.all().iter().any(|o| o.eq_ignore_ascii_case(&name));
        if name.starts_with('.') || name.ends_with(".tmp") || is_output {
            continue;
        }
        files.push(name);
    }
    files.sort();

    let mut claimed = vec![false; files.len()];
    let mut claim = |category: &str, patterns: &[String]| -> Option<PathBuf> {
        for raw in patterns {
            let pattern = match glob::Pattern::new(raw) {
                Ok(p) => p,
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "ignoring invalid input pattern");
                    continue;
                }
            };
            let hit = files
                .iter()
                .enumerate()
                .find(|(i, name)| !claimed[*i] && pattern.matches_with(name, MATCH_OPTIONS));
            if let Some((i, name)) = hit {
                claimed[i] = true;
                debug!(category, file = %name, pattern = %raw, "input located");
                return Some(dir.join(name));
            }
        }
        None
    };

    let mut found = DiscoveredInputs::default();
    for method in methods {
        if let Some(path) = claim(method, &patterns.result_patterns(method)) {
            found.results.push((method.clone(), path));
        }
    }
    found.boundaries = claim("boundaries", &patterns.boundaries);
    found.tabular = claim("tabular", &patterns.tabular);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, names: &[&str]) {
        for n in names {
            fs::write(dir.join(n), b"x").unwrap();
        }
    }

    fn methods() -> Vec<String> {
        vec!["composite".into(), "pca".into(), "ensemble".into()]
    }

    #[test]
    fn claims_results_before_tabular() {
        let dir = tempdir().unwrap();
        touch(
            dir.path(),
            &["PCA_Rankings.csv", "kano_survey.csv", "wards.zip", "composite_scores.json", "notes.md"],
        );
        let found = discover(dir.path(), &InputPatterns::default(), &methods(), &OutputNames::default()).unwrap();

        assert_eq!(found.tabular, Some(dir.path().join("kano_survey.csv")));
        assert_eq!(found.boundaries, Some(dir.path().join("wards.zip")));
        assert_eq!(
            found.results,
            vec![
                ("composite".to_string(), dir.path().join("composite_scores.json")),
                ("pca".to_string(), dir.path().join("PCA_Rankings.csv")),
            ]
        );
    }

    #[test]
    fn ignores_previous_outputs() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &["fused_dataset.csv", "fused_dataset.gpkg.tmp", ".hidden.csv"]);
        let found = discover(dir.path(), &InputPatterns::default(), &methods(), &OutputNames::default()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn pattern_order_beats_file_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &["a_extra.csv", "z_tabular.csv"]);
        let found = discover(dir.path(), &InputPatterns::default(), &[], &OutputNames::default()).unwrap();
        assert_eq!(found.tabular, Some(dir.path().join("z_tabular.csv")));
    }

    #[test]
    fn missing_directory() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("nope"), &InputPatterns::default(), &[], &OutputNames::default());
        assert!(matches!(err, Err(IoError::MissingDirectory(_))));
    }
}
