//! Left-joins analysis result tables onto the fused identity set.

use std::collections::HashSet;

use geofuse_core::{FusedDataset, Source, Table};
use tracing::info;

use crate::config::{FusionConfig, SynonymConfig};
use crate::duplicates::resolve_duplicates;
use crate::error::FusionError;
use crate::identity::SourceColumns;
use crate::matcher::{plan_matches, MatchKey, MatchOptions};
use crate::model::{DiagnosticKind, Diagnostics, ResultMergeStats, Stage};
use crate::payload::ResultTable;

/// Unmatched names listed in a diagnostic before truncating.
const SAMPLE_NAMES: usize = 5;

/// Merge every result table in order. The record count never changes.
pub fn merge_result_tables(
    dataset: &mut FusedDataset,
    tables: Vec<ResultTable>,
    cfg: &FusionConfig,
    diags: &mut Diagnostics,
) -> Vec<ResultMergeStats> {
    tables
        .into_iter()
        .filter_map(|t| merge_one(dataset, t, cfg, diags))
        .collect()
}

/// Column-safe method name: lowercase ASCII alphanumerics and underscores.
pub fn method_slug(method: &str) -> String {
    let slug: String = method
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "result".to_string()
    } else {
        slug
    }
}

fn merge_one(
    dataset: &mut FusedDataset,
    result: ResultTable,
    cfg: &FusionConfig,
    diags: &mut Diagnostics,
) -> Option<ResultMergeStats> {
    let method = method_slug(&result.method);
    let origin = result.origin.clone().unwrap_or_else(|| method.clone());
    let mut table = result.payload.into_table();

    if table.is_empty() {
        diags.push(
            Stage::Results,
            DiagnosticKind::EmptyResultTable,
            format!("{method}: result table from {origin} has no rows; skipped"),
        );
        return None;
    }

    let cols = SourceColumns::detect(&table, cfg);
    let Some(name_col) = cols.name.clone() else {
        let err = FusionError::JoinKeyNotFound { source_name: method.clone() };
        diags.push(Stage::Results, DiagnosticKind::JoinKeyNotFound, err.to_string());
        return None;
    };
    let code_index = cols.code.as_ref().map(|c| c.index);
    resolve_duplicates(&mut table, name_col.index, code_index, &method, diags);

    let is_identifier = |c: usize| c == name_col.index || Some(c) == code_index;
    standardize_columns(&mut table, &method, &cfg.results.synonyms, &is_identifier);

    let left: Vec<MatchKey> = dataset
        .records
        .iter()
        .map(|r| MatchKey::new(&r.primary_name, r.secondary_code.as_deref()))
        .collect();
    let right = cols.keys(&table);
    let options = MatchOptions {
        use_codes: cfg.matching.use_code_join && code_index.is_some(),
        fuzzy: None,
    };
    let plan = plan_matches(&left, &right, options);

    let mut stats = ResultMergeStats {
        method: method.clone(),
        rows: table.len(),
        matched: plan.pairs.len(),
        ..Default::default()
    };

    // Unpaired rows sharing a key with a paired row lost to the first occurrence.
    let paired_keys: HashSet<String> = plan.pairs.iter().map(|p| right[p.right].name.full()).collect();
    let (duplicates, unmatched): (Vec<usize>, Vec<usize>) = plan
        .right_only
        .iter()
        .copied()
        .partition(|r| paired_keys.contains(&right[*r].name.full()));
    stats.duplicate_keys = duplicates.len();
    stats.unmatched = unmatched.len();

    if stats.duplicate_keys > 0 {
        diags.push(
            Stage::Results,
            DiagnosticKind::DuplicateResultKeys,
            format!(
                "{method}: {} row(s) repeat an already joined key; first occurrence kept",
                stats.duplicate_keys
            ),
        );
    }
    if stats.unmatched > 0 {
        diags.push(
            Stage::Results,
            DiagnosticKind::UnmatchedResultRows,
            format!(
                "{method}: {} of {} row(s) matched no unit: {}",
                stats.unmatched,
                stats.rows,
                sample_names(&table, name_col.index, &unmatched)
            ),
        );
    }

    if plan.pairs.is_empty() {
        info!(method = %method, rows = stats.rows, "result table matched no units; no columns added");
        return Some(stats);
    }

    let incoming: Vec<(usize, String)> = (0..table.width())
        .filter(|&c| !is_identifier(c))
        .map(|c| (c, dataset.add_column(&table.columns[c], &method)))
        .collect();
    let rank_target = format!("{method}_rank");
    stats.rank_column = incoming
        .iter()
        .find(|(c, _)| table.columns[*c] == rank_target)
        .map(|(_, out)| out.clone());
    stats.columns_added = incoming.iter().map(|(_, out)| out.clone()).collect();

    let source = Source::Result(method.clone());
    for p in &plan.pairs {
        let record = &mut dataset.records[p.left];
        for (col, out) in &incoming {
            let value = table.get(p.right, *col);
            if !value.is_null() {
                record.set(out.clone(), value.clone());
            }
        }
        record.provenance.insert(source.clone());
    }

    info!(
        method = %method,
        rows = stats.rows,
        matched = stats.matched,
        unmatched = stats.unmatched,
        columns = stats.columns_added.len(),
        "result table merged"
    );
    Some(stats)
}

/// Rename the first score, rank and category synonym to `{method}_{kind}`.
fn standardize_columns(
    table: &mut Table,
    method: &str,
    synonyms: &SynonymConfig,
    is_identifier: &dyn Fn(usize) -> bool,
) {
    let mut taken: Vec<usize> = Vec::new();
    for (kind, names) in [
        ("score", &synonyms.score),
        ("rank", &synonyms.rank),
        ("category", &synonyms.category),
    ] {
        let found = names.iter().find_map(|syn| {
            (0..table.width()).find(|&c| {
                !is_identifier(c) && !taken.contains(&c) && table.columns[c].trim().eq_ignore_ascii_case(syn)
            })
        });
        if let Some(c) = found {
            table.rename_column(c, format!("{method}_{kind}"));
            taken.push(c);
        }
    }
}

fn sample_names(table: &Table, name_col: usize, rows: &[usize]) -> String {
    let mut names: Vec<String> = rows
        .iter()
        .take(SAMPLE_NAMES)
        .map(|&r| table.text(r, name_col))
        .collect();
    if rows.len() > SAMPLE_NAMES {
        names.push(format!("... {} more", rows.len() - SAMPLE_NAMES));
    }
    names.join(", ")
}
