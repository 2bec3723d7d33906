// Application settings
// Loaded from ~/.config/geofuse/settings.toml

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("settings validation error: {0}")]
    Invalid(String),

    #[error("cannot serialize settings: {0}")]
    Serialize(String),
}

/// Glob patterns locating each input inside a session directory.
/// Patterns are tried in order; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPatterns {
    pub tabular: Vec<String>,
    pub boundaries: Vec<String>,
    /// Per result method. Methods without an entry use `*{method}*.csv` / `.json`.
    pub results: BTreeMap<String, Vec<String>>,
}

impl Default for InputPatterns {
    fn default() -> Self {
        let mut results = BTreeMap::new();
        for method in ["composite", "pca", "ensemble"] {
            results.insert(
                method.to_string(),
                vec![format!("*{method}*.csv"), format!("*{method}*.json")],
            );
        }
        Self {
            tabular: strings(&["*survey*.csv", "*tabular*.csv", "*.csv", "*.tsv", "*.txt"]),
            boundaries: strings(&["*.zip", "*.geojson", "*boundar*.json"]),
            results,
        }
    }
}

impl InputPatterns {
    pub fn result_patterns(&self, method: &str) -> Vec<String> {
        self.results
            .get(method)
            .cloned()
            .unwrap_or_else(|| vec![format!("*{method}*.csv"), format!("*{method}*.json")])
    }
}

/// Output file names, written inside the session directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub primary: String,
    pub csv: String,
    pub json: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            primary: "fused_dataset.gpkg".into(),
            csv: "fused_dataset.csv".into(),
            json: "fused_dataset.json".into(),
        }
    }
}

impl OutputNames {
    pub fn all(&self) -> [&str; 3] {
        [&self.primary, &self.csv, &self.json]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Existence checks after the primary write.
    pub visibility_attempts: u32,
    pub visibility_delay_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            visibility_attempts: 3,
            visibility_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when no env override is set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: "info".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one sub-directory per session.
    pub sessions_root: PathBuf,
    /// Optional engine tuning file (TOML).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_config: Option<PathBuf>,
    /// Optional column category rules (TOML).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_rules: Option<PathBuf>,
    pub inputs: InputPatterns,
    pub outputs: OutputNames,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sessions_root: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("geofuse")
                .join("sessions"),
            fusion_config: None,
            category_rules: None,
            inputs: InputPatterns::default(),
            outputs: OutputNames::default(),
            persistence: PersistenceSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geofuse")
            .join("settings.toml")
    }

    /// Load settings from the default location; a missing file means defaults.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.persistence.visibility_attempts == 0 {
            return Err(SettingsError::Invalid(
                "persistence.visibility_attempts must be at least 1".into(),
            ));
        }
        if self.inputs.tabular.is_empty() {
            return Err(SettingsError::Invalid("inputs.tabular has no patterns".into()));
        }
        let outputs = self.outputs.all();
        if outputs.iter().any(|o| o.trim().is_empty()) {
            return Err(SettingsError::Invalid("output file names must not be empty".into()));
        }
        if outputs[0] == outputs[1] || outputs[0] == outputs[2] || outputs[1] == outputs[2] {
            return Err(SettingsError::Invalid("output file names must differ".into()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(|e| SettingsError::Serialize(e.to_string()))
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_root.join(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.outputs.primary, "fused_dataset.gpkg");
        assert_eq!(s.persistence.visibility_attempts, 3);
        assert_eq!(s.persistence.visibility_delay_ms, 250);
        assert_eq!(s.inputs.result_patterns("pca"), vec!["*pca*.csv", "*pca*.json"]);
        assert_eq!(s.inputs.result_patterns("xgb"), vec!["*xgb*.csv", "*xgb*.json"]);
        s.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
sessions_root = "/srv/sessions"

[persistence]
visibility_delay_ms = 10

[inputs.results]
ensemble = ["rf_*.csv"]
"#,
        )
        .unwrap();
        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.session_dir("abc"), PathBuf::from("/srv/sessions/abc"));
        assert_eq!(s.persistence.visibility_delay_ms, 10);
        assert_eq!(s.persistence.visibility_attempts, 3);
        assert_eq!(s.inputs.result_patterns("ensemble"), vec!["rf_*.csv"]);
        assert!(!s.inputs.results.contains_key("pca"));
        assert_eq!(s.inputs.result_patterns("pca"), vec!["*pca*.csv", "*pca*.json"]);
    }

    #[test]
    fn printed_toml_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut s = Settings::default();
        s.logging.filter = "debug".into();
        s.fusion_config = Some(PathBuf::from("/etc/geofuse/fusion.toml"));
        fs::write(&path, s.to_toml().unwrap()).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), s);
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[persistence]\nvisibility_attempts = 0\n").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(SettingsError::Invalid(_))));

        fs::write(&path, "[outputs]\ncsv = \"fused_dataset.gpkg\"\n").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(SettingsError::Invalid(_))));

        fs::write(&path, "sessions_root = 3\n").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
