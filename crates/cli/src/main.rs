// geofuse CLI - batch fusion of survey, boundary and result data per session

mod exit_codes;
mod logging;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use geofuse_config::{Settings, SettingsError};
use geofuse_io::gpkg;
use geofuse_io::session::{load_engine_config, validate_session_id};
use geofuse_io::{FusionReport, RunOutcome, SessionRunner};
use geofuse_recon::{CategoryRules, FusionConfig, FusionError};
use tracing::debug;

use exit_codes::{
    failure_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_MISSING_INPUT, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "geofuse")]
#[command(about = "Fuse survey tables, ward boundaries and analysis results into one dataset")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/geofuse/settings.toml)
    #[arg(long, global = true, env = "GEOFUSE_SETTINGS")]
    settings: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fusion pipeline for one session
    #[command(after_help = "\
Examples:
  geofuse run kano-2024
  geofuse run demo --dir ./inputs --json
  geofuse run kano-2024 --config fusion.toml")]
    Run {
        /// Session id (directory name under the sessions root)
        session: String,

        /// Read inputs from and write outputs to this directory instead
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Fusion config file (overrides settings)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Column category rules file (overrides settings)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Fixed generation timestamp, for reproducible output
        #[arg(long, value_name = "RFC3339")]
        generated_at: Option<String>,

        /// Print the run outcome as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Check a config file without running anything
    ValidateConfig {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "fusion")]
        kind: ConfigKind,
    },

    /// Summarize a written GeoPackage
    Inspect {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Settings file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the settings file location
    Path,
    /// Print the effective settings as TOML
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigKind {
    Fusion,
    Categories,
    Settings,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nbuild:   ", env!("GEOFUSE_BUILD_PROFILE"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = load_settings(cli.settings.as_ref()).and_then(|settings| {
        logging::init(cli.verbose, &settings.logging.filter);
        match cli.command {
            Commands::Run {
                session,
                dir,
                config,
                rules,
                generated_at,
                json,
            } => cmd_run(settings, session, dir, config, rules, generated_at, json),
            Commands::ValidateConfig { file, kind } => cmd_validate_config(file, kind),
            Commands::Inspect { file, json } => cmd_inspect(file, json),
            Commands::Config { command } => match command {
                ConfigCommands::Path => cmd_config_path(cli.settings.as_ref()),
                ConfigCommands::Show => cmd_config_show(&settings),
            },
        }
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, msg)
    }

    /// Exit with `code` without printing anything further.
    pub fn silent(code: u8) -> Self {
        Self::new(code, "")
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        let hint = match &err {
            SettingsError::Parse { .. } | SettingsError::Invalid(_) => {
                Some("run `geofuse config show` to see the defaults".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }
}

impl From<FusionError> for CliError {
    fn from(err: FusionError) -> Self {
        let code = match &err {
            FusionError::ConfigParse(_) | FusionError::ConfigValidation(_) => EXIT_CONFIG,
            FusionError::MissingInput(_) | FusionError::Parse(_) => EXIT_MISSING_INPUT,
            _ => EXIT_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, CliError> {
    let settings = match path {
        Some(p) => Settings::load_from(p)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    mut settings: Settings,
    session: String,
    dir: Option<PathBuf>,
    config: Option<PathBuf>,
    rules: Option<PathBuf>,
    generated_at: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    validate_session_id(&session).map_err(|e| {
        CliError::usage(e.to_string()).with_hint("session ids use letters, digits, '-', '_' and '.'")
    })?;
    if config.is_some() {
        settings.fusion_config = config;
    }
    if rules.is_some() {
        settings.category_rules = rules;
    }
    let (fusion_config, category_rules) = load_engine_config(&settings)?;
    debug!(
        session = %session,
        fusion_config = ?settings.fusion_config,
        methods = ?fusion_config.results.methods,
        "starting run"
    );

    let mut runner = SessionRunner::new(settings, fusion_config, category_rules);
    if let Some(ts) = generated_at {
        runner = runner.with_generated_at(ts);
    }
    let outcome = match &dir {
        Some(dir) => runner.run_in(&session, dir),
        None => runner.run(&session),
    };

    if json {
        let text = serde_json::to_string_pretty(&outcome)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot serialize outcome: {e}")))?;
        println!("{text}");
    }

    match outcome {
        RunOutcome::Success(report) => {
            if !json {
                print_report(&report);
            }
            Ok(())
        }
        RunOutcome::Failure(failure) => {
            let code = failure_exit_code(&failure);
            if json {
                Err(CliError::silent(code))
            } else {
                Err(CliError::new(code, failure.to_string()))
            }
        }
    }
}

fn print_report(report: &FusionReport) {
    let meta = &report.metadata;
    println!("session:   {}", report.session_id);
    println!("records:   {} ({} columns)", meta.row_count, meta.column_count);
    println!(
        "matched:   {} (code {}, exact {}, fuzzy {}); tabular-only {}, boundary-only {}",
        meta.matching.matched(),
        meta.matching.matched_by_code,
        meta.matching.matched_exact,
        meta.matching.matched_fuzzy,
        meta.matching.tabular_only,
        meta.matching.boundary_only
    );
    for r in &meta.results {
        println!("result:    {} matched {}/{} rows", r.method, r.matched, r.rows);
    }
    println!(
        "quality:   completeness {:.1}%, geometry {:.1}%",
        meta.quality.completeness * 100.0,
        meta.quality.geometry_coverage * 100.0
    );
    println!("written:   {}", report.persisted.primary.display());
    for b in &report.persisted.backups {
        println!("backup:    {}", b.display());
    }
    if !meta.warnings.is_empty() {
        println!("warnings:  {}", meta.warnings.len());
        for w in &meta.warnings {
            println!("  [{}] {}", w.stage, w.message);
        }
    }
}

// ============================================================================
// validate-config
// ============================================================================

fn cmd_validate_config(file: PathBuf, kind: ConfigKind) -> Result<(), CliError> {
    let text = fs::read_to_string(&file)
        .map_err(|e| CliError::usage(format!("cannot read {}: {e}", file.display())))?;
    match kind {
        ConfigKind::Fusion => {
            FusionConfig::from_toml(&text).map_err(|e| CliError::config(e.to_string()))?;
        }
        ConfigKind::Categories => {
            CategoryRules::from_toml(&text).map_err(|e| CliError::config(e.to_string()))?;
        }
        ConfigKind::Settings => {
            Settings::load_from(&file)?;
        }
    }
    println!("ok: {}", file.display());
    Ok(())
}

// ============================================================================
// inspect
// ============================================================================

fn cmd_inspect(file: PathBuf, json: bool) -> Result<(), CliError> {
    let summary = gpkg::read_summary(&file)
        .map_err(|e| CliError::new(EXIT_MISSING_INPUT, e.to_string()))?;

    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    println!("file:      {}", file.display());
    println!("features:  {} ({} with geometry)", summary.feature_count, summary.with_geometry);
    println!("geometry:  {} (EPSG:{})", summary.geometry_type, summary.srs_id);
    println!("columns:");
    for (name, ty) in &summary.columns {
        println!("  {name:<32} {ty}");
    }
    if !summary.meta.is_empty() {
        println!("meta:");
        for (k, v) in &summary.meta {
            println!("  {k:<16} {v}");
        }
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config_path(explicit: Option<&PathBuf>) -> Result<(), CliError> {
    let path = explicit.cloned().unwrap_or_else(Settings::config_path);
    println!("{}", path.display());
    Ok(())
}

fn cmd_config_show(settings: &Settings) -> Result<(), CliError> {
    print!("{}", settings.to_toml()?);
    Ok(())
}
