// Configuration loading

pub mod settings;

pub use settings::{InputPatterns, LoggingSettings, OutputNames, PersistenceSettings, Settings, SettingsError};
