use std::fs;
use std::path::Path;
use std::sync::Arc;

use geofuse_config::Settings;
use geofuse_io::gpkg;
use geofuse_io::{RunOutcome, SessionRunner, SessionStore};
use geofuse_recon::{CategoryRules, DiagnosticKind, FusionConfig, Stage};
use tempfile::TempDir;

const SURVEY: &str = "\
WardName,WardCode,tpr,u5_population,rainfall,itn_coverage,housing_quality
Kawo,NISKNT04,0.31,1200,900,0.4,0.6
Kawo,NISNAS04,0.12,800,950,0.5,0.7
Birnin Kudu,,0.2,100,800,0.3,0.5
Gwale,GWL01,0.18,950,870,0.45,0.55
";

const BOUNDARIES: &str = r#"{"type": "FeatureCollection", "features": [
  {"type": "Feature", "properties": {"wardname": "Kawo (NISKNT04)"},
   "geometry": {"type": "Polygon", "coordinates": [[[8.0,11.0],[8.1,11.0],[8.1,11.1],[8.0,11.1],[8.0,11.0]]]}},
  {"type": "Feature", "properties": {"wardname": "Kawo (NISNAS04)"},
   "geometry": {"type": "Polygon", "coordinates": [[[8.2,11.0],[8.3,11.0],[8.3,11.1],[8.2,11.1],[8.2,11.0]]]}},
  {"type": "Feature", "properties": {"wardname": "Birni Kudu"},
   "geometry": {"type": "Polygon", "coordinates": [[[8.4,11.0],[8.5,11.0],[8.5,11.1],[8.4,11.1],[8.4,11.0]]]}},
  {"type": "Feature", "properties": {"wardname": "Tarauni"},
   "geometry": {"type": "Polygon", "coordinates": [[[8.6,11.0],[8.7,11.0],[8.7,11.1],[8.6,11.1],[8.6,11.0]]]}}
]}"#;

const COMPOSITE: &str = "ward,rank\nGwale,1\nBirnin Kudu,2\n";
const PCA: &str = r#"["Birnin Kudu", "Gwale"]"#;

fn sessions_root() -> (TempDir, Settings) {
    let root = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.sessions_root = root.path().to_path_buf();
    settings.persistence.visibility_delay_ms = 1;
    (root, settings)
}

fn write_session(settings: &Settings, id: &str, survey: &str) {
    let dir = settings.session_dir(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("kano_survey.csv"), survey).unwrap();
    fs::write(dir.join("ward_boundaries.geojson"), BOUNDARIES).unwrap();
    fs::write(dir.join("composite_scores.csv"), COMPOSITE).unwrap();
    fs::write(dir.join("pca_rankings.json"), PCA).unwrap();
}

fn runner(settings: Settings) -> SessionRunner {
    SessionRunner::new(settings, FusionConfig::default(), CategoryRules::default())
        .with_generated_at("2026-01-01T00:00:00Z")
}

fn outputs(dir: &Path) -> [bool; 3] {
    ["fused_dataset.gpkg", "fused_dataset.csv", "fused_dataset.json"].map(|n| dir.join(n).exists())
}

#[test]
fn full_session_writes_outputs_and_summary() {
    let (_root, settings) = sessions_root();
    write_session(&settings, "kano", SURVEY);
    let dir = settings.session_dir("kano");

    let outcome = runner(settings).run("kano");
    let report = match &outcome {
        RunOutcome::Success(r) => r,
        RunOutcome::Failure(f) => panic!("run failed: {f}"),
    };
    assert_eq!(outputs(&dir), [true, true, true]);
    assert_eq!(report.persisted.backups.len(), 2);

    let meta = &report.metadata;
    // four survey rows plus the boundary-only Tarauni
    assert_eq!(meta.row_count, 5);
    assert_eq!(meta.matching.matched(), 3);
    assert_eq!(meta.quality.records_with_geometry, 4);
    assert_eq!(meta.inputs.len(), 4);
    assert_eq!(meta.generated_at, "2026-01-01T00:00:00Z");
    assert!(meta.columns.contains(&"composite_rank".to_string()));
    assert!(meta.columns.contains(&"pca_rank".to_string()));
    assert!(meta.columns.contains(&"area_km2".to_string()));
    assert!(meta.categories["health"].contains(&"tpr".to_string()));

    let summary = gpkg::read_summary(&dir.join("fused_dataset.gpkg")).unwrap();
    assert_eq!(summary.feature_count, 5);
    assert_eq!(summary.with_geometry, 4);
    assert_eq!(summary.meta["session_id"], "kano");
    assert_eq!(summary.meta["row_count"], "5");
}

#[test]
fn rerun_with_same_inputs_is_byte_identical() {
    let (_root, settings) = sessions_root();
    write_session(&settings, "kano", SURVEY);
    let primary = settings.session_dir("kano").join("fused_dataset.gpkg");
    let runner = runner(settings);

    assert!(runner.run("kano").is_success());
    let first = fs::read(&primary).unwrap();
    assert!(runner.run("kano").is_success());
    assert_eq!(fs::read(&primary).unwrap(), first);
}

#[test]
fn zero_rows_fails_validation_and_writes_nothing() {
    let (_root, settings) = sessions_root();
    let header_only = SURVEY.lines().next().unwrap().to_string() + "\n";
    write_session(&settings, "empty", &header_only);
    let dir = settings.session_dir("empty");

    let outcome = runner(settings).run("empty");
    let failure = outcome.failure().expect("must fail");
    assert_eq!(failure.stage, Stage::Validation);
    assert_eq!(failure.code, "validation_failure");
    assert_eq!(outputs(&dir), [false, false, false]);
}

#[test]
fn attribute_differing_only_in_case_gets_suffixed() {
    let (_root, settings) = sessions_root();
    let dir = settings.session_dir("case");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("survey.csv"), "ward,tpr\nKawo,0.31\n").unwrap();
    fs::write(
        dir.join("wards.geojson"),
        r#"{"type": "FeatureCollection", "features": [
          {"type": "Feature", "properties": {"wardname": "Kawo", "TPR": 0.9},
           "geometry": {"type": "Polygon", "coordinates": [[[8.0,11.0],[8.1,11.0],[8.1,11.1],[8.0,11.0]]]}}
        ]}"#,
    )
    .unwrap();

    let outcome = runner(settings).run("case");
    let report = outcome.report().unwrap_or_else(|| panic!("run failed: {:?}", outcome.failure()));
    assert!(report.metadata.columns.contains(&"tpr".to_string()));
    assert!(report.metadata.columns.contains(&"TPR_boundary".to_string()));
    assert_eq!(outputs(&dir), [true, true, true]);
}

#[test]
fn persistence_failure_leaves_no_backups() {
    let (_root, mut settings) = sessions_root();
    settings.outputs.primary = "missing/dir/fused_dataset.gpkg".into();
    write_session(&settings, "kano", SURVEY);
    let dir = settings.session_dir("kano");

    let outcome = runner(settings).run("kano");
    assert_eq!(outcome.failure().unwrap().stage, Stage::Persistence);
    assert_eq!(outputs(&dir), [false, false, false]);
}

#[test]
fn unreadable_result_file_is_skipped_with_warning() {
    let (_root, settings) = sessions_root();
    write_session(&settings, "kano", SURVEY);
    let dir = settings.session_dir("kano");
    fs::write(dir.join("pca_rankings.json"), r#"[1, {"a": 2}]"#).unwrap();

    let outcome = runner(settings).run("kano");
    let report = outcome.report().unwrap_or_else(|| panic!("run failed: {:?}", outcome.failure()));
    let meta = &report.metadata;
    assert!(meta.columns.contains(&"composite_rank".to_string()));
    assert!(!meta.columns.contains(&"pca_rank".to_string()));
    let invalid: Vec<_> = meta.warnings.iter().filter(|w| w.kind == DiagnosticKind::InvalidInput).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].stage, Stage::Load);
}

#[test]
fn unreadable_boundaries_degrade_to_no_geometry() {
    let (_root, settings) = sessions_root();
    write_session(&settings, "kano", SURVEY);
    let dir = settings.session_dir("kano");
    fs::write(dir.join("ward_boundaries.geojson"), "{ truncated").unwrap();

    let outcome = runner(settings).run("kano");
    let report = outcome.report().unwrap_or_else(|| panic!("run failed: {:?}", outcome.failure()));
    assert_eq!(report.metadata.row_count, 4);
    assert_eq!(report.metadata.quality.records_with_geometry, 0);
    assert!(!report.metadata.columns.contains(&"area_km2".to_string()));
}

#[test]
fn missing_tabular_is_load_failure() {
    let (_root, settings) = sessions_root();
    let dir = settings.session_dir("nosurvey");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ward_boundaries.geojson"), BOUNDARIES).unwrap();

    let outcome = runner(settings).run("nosurvey");
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.code, "missing_input");
}

#[test]
fn unknown_session_is_load_failure() {
    let (_root, settings) = sessions_root();
    let outcome = runner(settings).run("ghost");
    assert_eq!(outcome.failure().unwrap().stage, Stage::Load);
}

#[test]
fn store_caches_until_reload() {
    let (_root, settings) = sessions_root();
    write_session(&settings, "kano", SURVEY);
    let survey = settings.session_dir("kano").join("kano_survey.csv");
    let mut store = SessionStore::new(runner(settings));

    let first = store.get_or_run("kano");
    assert!(first.is_success());
    assert!(Arc::ptr_eq(&first, &store.get_or_run("kano")));

    // Inputs change underneath; the cached outcome stands until reload.
    fs::remove_file(&survey).unwrap();
    assert!(store.get_or_run("kano").is_success());

    let reloaded = store.reload("kano");
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(reloaded.failure().unwrap().stage, Stage::Load);

    assert!(store.evict("kano"));
    assert!(store.get("kano").is_none());
    assert!(store.is_empty());
}
