use std::collections::BTreeMap;

use geofuse_core::FusedDataset;
use serde::Serialize;

use crate::categories::CategoryRules;
use crate::derived::DerivedSummary;
use crate::model::{Diagnostic, FusionOutput, MatchStats, ResultMergeStats};
use crate::validate::completeness;

/// Content hash of one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFingerprint {
    /// `tabular`, `boundary` or `result:<method>`.
    pub category: String,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub records_with_geometry: usize,
    pub geometry_coverage: f64,
    pub matched_records: usize,
    pub match_rate: f64,
    /// Null count per attribute column; complete columns are omitted.
    pub missing_by_column: BTreeMap<String, usize>,
}

impl QualityMetrics {
    pub fn measure(dataset: &FusedDataset) -> Self {
        let n = dataset.len();
        let share = |count: usize| if n == 0 { 0.0 } else { count as f64 / n as f64 };
        let with_geometry = dataset.records_with_geometry();
        let matched = dataset.records.iter().filter(|r| r.match_info.matched()).count();
        let missing_by_column = dataset
            .columns
            .iter()
            .map(|c| (c.clone(), dataset.records.iter().filter(|r| r.get(c).is_null()).count()))
            .filter(|(_, missing)| *missing > 0)
            .collect();
        Self {
            completeness: completeness(dataset),
            records_with_geometry: with_geometry,
            geometry_coverage: share(with_geometry),
            matched_records: matched,
            match_rate: share(matched),
            missing_by_column,
        }
    }
}

/// Run summary handed back to the caller alongside the written files.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataSummary {
    pub session_id: String,
    pub generated_at: String,
    pub engine_version: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub categories: BTreeMap<String, Vec<String>>,
    pub quality: QualityMetrics,
    pub matching: MatchStats,
    pub results: Vec<ResultMergeStats>,
    pub derived: DerivedSummary,
    pub warnings: Vec<Diagnostic>,
    pub inputs: Vec<InputFingerprint>,
}

impl MetadataSummary {
    pub fn build(
        output: &FusionOutput,
        rules: &CategoryRules,
        session_id: &str,
        generated_at: &str,
        inputs: Vec<InputFingerprint>,
    ) -> Self {
        let columns = output.dataset.output_columns();
        Self {
            session_id: session_id.to_string(),
            generated_at: generated_at.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            row_count: output.dataset.len(),
            column_count: columns.len(),
            categories: rules.categorize(&columns),
            columns,
            quality: QualityMetrics::measure(&output.dataset),
            matching: output.matching.clone(),
            results: output.results.clone(),
            derived: output.derived.clone(),
            warnings: output.diagnostics.iter().cloned().collect(),
            inputs,
        }
    }
}
