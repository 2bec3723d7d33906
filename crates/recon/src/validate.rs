use geofuse_core::{FusedDataset, Source};
use serde::Serialize;

use crate::config::ValidationConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Fatal findings; any entry aborts persistence.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub record_count: usize,
    pub attribute_columns: usize,
    /// Share of non-null attribute cells, 0..=1.
    pub completeness: f64,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Share of non-null cells over every record × attribute column.
/// An empty grid counts as complete.
pub fn completeness(dataset: &FusedDataset) -> f64 {
    let cells = dataset.records.len() * dataset.columns.len();
    if cells == 0 {
        return 1.0;
    }
    let filled: usize = dataset
        .records
        .iter()
        .map(|r| dataset.columns.iter().filter(|c| !r.get(c).is_null()).count())
        .sum();
    filled as f64 / cells as f64
}

/// Structural and completeness checks run before anything is written.
pub fn validate(dataset: &FusedDataset, cfg: &ValidationConfig) -> ValidationReport {
    let mut report = ValidationReport {
        record_count: dataset.len(),
        attribute_columns: dataset.columns.len(),
        completeness: completeness(dataset),
        ..Default::default()
    };

    if dataset.is_empty() {
        report.errors.push("fused dataset has no records".into());
    } else if !dataset.records.iter().any(|r| r.provenance.contains(&Source::Tabular)) {
        report.errors.push("no record carries tabular data".into());
    }

    if report.attribute_columns < cfg.min_attribute_columns {
        report.warnings.push(format!(
            "only {} attribute column(s); expected at least {}",
            report.attribute_columns, cfg.min_attribute_columns
        ));
    }
    if dataset.name_column.is_none() {
        report.warnings.push("no identifiable name column".into());
    }
    if !dataset.is_empty() && report.completeness < cfg.min_completeness {
        report.warnings.push(format!(
            "field completeness {:.1}% is below {:.1}%",
            report.completeness * 100.0,
            cfg.min_completeness * 100.0
        ));
    }

    report
}
