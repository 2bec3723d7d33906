//! Tabular ⟷ boundary identity join.
//!
//! The result is the union of both sides: every tabular row and every
//! boundary row yields exactly one record, paired or not.

use geofuse_core::{EntityRecord, FusedDataset, GeoTable, Geometry, MatchAnnotation, MatchMethod, Source, Table};
use tracing::info;

use crate::columns::{detect_code_column, detect_name_column, ColumnPick};
use crate::config::FusionConfig;
use crate::duplicates::resolve_duplicates;
use crate::error::FusionError;
use crate::matcher::{plan_matches, FuzzyOptions, MatchKey, MatchOptions, MatchPlan};
use crate::model::{DiagnosticKind, Diagnostics, MatchStats, Stage};
use crate::scorer::ScorerSet;

/// Identifier columns of one source.
#[derive(Debug, Clone, Default)]
pub struct SourceColumns {
    pub name: Option<ColumnPick>,
    pub code: Option<ColumnPick>,
}

impl SourceColumns {
    pub fn detect(table: &Table, cfg: &FusionConfig) -> Self {
        let code = detect_code_column(table, &cfg.columns.code);
        let name = detect_name_column(
            table,
            &cfg.columns.name,
            cfg.matching.synthetic_id_ratio,
            code.as_ref().map(|c| c.index),
        );
        Self { name, code }
    }

    fn is_identifier(&self, col: usize) -> bool {
        self.name.as_ref().is_some_and(|p| p.index == col) || self.code.as_ref().is_some_and(|p| p.index == col)
    }

    fn name_of(&self, table: &Table, row: usize) -> String {
        self.name.as_ref().map(|p| table.text(row, p.index)).unwrap_or_default()
    }

    fn code_of(&self, table: &Table, row: usize) -> Option<String> {
        self.code
            .as_ref()
            .map(|p| table.text(row, p.index))
            .filter(|c| !c.is_empty())
    }

    /// Match keys for every row.
    pub fn keys(&self, table: &Table) -> Vec<MatchKey> {
        (0..table.len())
            .map(|row| {
                let code = self.code_of(table, row);
                MatchKey::new(&self.name_of(table, row), code.as_deref())
            })
            .collect()
    }
}

/// Join the tabular source with the optional boundary source.
///
/// Records come out as tabular rows in source order, then boundary-only
/// rows in source order. Geometries are moved into their records.
pub fn fuse_identities(
    mut tabular: Table,
    boundaries: Option<GeoTable>,
    cfg: &FusionConfig,
    diags: &mut Diagnostics,
) -> (FusedDataset, MatchStats) {
    let GeoTable {
        table: mut boundary,
        mut geometries,
    } = boundaries.unwrap_or_default();
    let has_boundaries = !boundary.columns.is_empty() || !boundary.is_empty();

    let tab_cols = prepare(&mut tabular, cfg, "tabular", diags);
    let bnd_cols = if has_boundaries {
        prepare(&mut boundary, cfg, "boundary", diags)
    } else {
        SourceColumns::default()
    };

    let joinable = tab_cols.name.is_some() && (!has_boundaries || bnd_cols.name.is_some());
    let plan = if joinable && has_boundaries {
        let scorers = ScorerSet::from_kinds(&cfg.matching.scorers);
        let options = MatchOptions {
            use_codes: cfg.matching.use_code_join && tab_cols.code.is_some() && bnd_cols.code.is_some(),
            fuzzy: Some(FuzzyOptions {
                scorers: &scorers,
                threshold: cfg.matching.fuzzy_threshold,
            }),
        };
        plan_matches(&tab_cols.keys(&tabular), &bnd_cols.keys(&boundary), options)
    } else {
        MatchPlan {
            left_only: (0..tabular.len()).collect(),
            right_only: (0..boundary.len()).collect(),
            ..Default::default()
        }
    };

    for skipped in &plan.skipped {
        let err = FusionError::LowConfidenceMatchSkipped {
            name: tab_cols.name_of(&tabular, skipped.left),
            candidate: bnd_cols.name_of(&boundary, skipped.right),
            scorer: skipped.score.scorer.to_string(),
            score: skipped.score.value,
            threshold: cfg.matching.fuzzy_threshold,
        };
        diags.push(Stage::Identity, DiagnosticKind::LowConfidenceMatchSkipped, err.to_string());
    }

    // Column layout: tabular attributes, then boundary attributes.
    let mut dataset = FusedDataset {
        name_column: tab_cols.name.as_ref().or(bnd_cols.name.as_ref()).map(|p| p.name.clone()),
        code_column: tab_cols.code.as_ref().or(bnd_cols.code.as_ref()).map(|p| p.name.clone()),
        ..Default::default()
    };
    let tab_attrs: Vec<(usize, String)> = (0..tabular.width())
        .filter(|&c| !tab_cols.is_identifier(c))
        .map(|c| (c, dataset.add_column(&tabular.columns[c], "tabular")))
        .collect();
    let bnd_attrs: Vec<(usize, String)> = (0..boundary.width())
        .filter(|&c| !bnd_cols.is_identifier(c))
        .map(|c| (c, dataset.add_column(&boundary.columns[c], "boundary")))
        .collect();

    let mut records = Vec::with_capacity(tabular.len() + plan.right_only.len());
    for (row, pairing) in plan.by_left(tabular.len()).into_iter().enumerate() {
        let mut record = EntityRecord {
            primary_name: tab_cols.name_of(&tabular, row),
            secondary_code: tab_cols.code_of(&tabular, row),
            ..Default::default()
        };
        record.provenance.insert(Source::Tabular);
        copy_attributes(&mut record, &tabular, row, &tab_attrs);

        if let Some(p) = pairing {
            attach_boundary(&mut record, &boundary, &mut geometries, p.right, &bnd_cols, &bnd_attrs);
            record.match_info = MatchAnnotation {
                method: p.method,
                confidence: Some(p.confidence),
                scorer: p.scorer.map(str::to_string),
            };
        }
        records.push(record);
    }

    for &row in &plan.right_only {
        let mut record = EntityRecord {
            primary_name: bnd_cols.name_of(&boundary, row),
            ..Default::default()
        };
        attach_boundary(&mut record, &boundary, &mut geometries, row, &bnd_cols, &bnd_attrs);
        records.push(record);
    }
    dataset.records = records;

    let stats = MatchStats {
        tabular_rows: tabular.len(),
        boundary_rows: boundary.len(),
        matched_by_code: plan.count(MatchMethod::Code),
        matched_exact: plan.count(MatchMethod::Exact),
        matched_fuzzy: plan.count(MatchMethod::Fuzzy),
        tabular_only: plan.left_only.len(),
        boundary_only: plan.right_only.len(),
        low_confidence_skipped: plan.skipped.len(),
    };
    info!(
        tabular = stats.tabular_rows,
        boundary = stats.boundary_rows,
        code = stats.matched_by_code,
        exact = stats.matched_exact,
        fuzzy = stats.matched_fuzzy,
        tabular_only = stats.tabular_only,
        boundary_only = stats.boundary_only,
        "identity join complete"
    );
    (dataset, stats)
}

/// Detect identifier columns and disambiguate duplicate names in place.
fn prepare(table: &mut Table, cfg: &FusionConfig, label: &str, diags: &mut Diagnostics) -> SourceColumns {
    let cols = SourceColumns::detect(table, cfg);
    match &cols.name {
        Some(name) => {
            resolve_duplicates(table, name.index, cols.code.as_ref().map(|c| c.index), label, diags);
        }
        None => {
            let err = FusionError::JoinKeyNotFound {
                source_name: label.to_string(),
            };
            diags.push(Stage::Identity, DiagnosticKind::JoinKeyNotFound, err.to_string());
        }
    }
    cols
}

fn copy_attributes(record: &mut EntityRecord, table: &Table, row: usize, columns: &[(usize, String)]) {
    for (col, out) in columns {
        let value = table.get(row, *col);
        if !value.is_null() {
            record.set(out.clone(), value.clone());
        }
    }
}

fn attach_boundary(
    record: &mut EntityRecord,
    boundary: &Table,
    geometries: &mut [Option<Geometry>],
    row: usize,
    cols: &SourceColumns,
    attrs: &[(usize, String)],
) {
    record.provenance.insert(Source::Boundary);
    if record.secondary_code.is_none() {
        record.secondary_code = cols.code_of(boundary, row);
    }
    record.geometry = geometries.get_mut(row).and_then(Option::take);
    copy_attributes(record, boundary, row, attrs);
}
