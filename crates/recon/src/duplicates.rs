use std::collections::{BTreeSet, HashMap};

use geofuse_core::{Table, Value};
use serde::Serialize;
use tracing::debug;

use crate::model::{DiagnosticKind, Diagnostics, Stage};
use crate::normalize::NameKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    /// Names that occurred more than once, as first seen.
    pub duplicate_names: Vec<String>,
    /// Rows rewritten to `"{name} ({code})"`.
    pub renamed: usize,
    /// Duplicate rows left unchanged because their code was empty.
    pub unresolved: usize,
    /// Names still duplicated after resolution.
    pub residual: Vec<String>,
}

/// Rewrite every occurrence of a duplicated name to `"{name} ({code})"`.
///
/// Without a code column nothing changes. Residual duplicates (shared or
/// missing codes) are reported as a warning, never an error.
pub fn resolve_duplicates(
    table: &mut Table,
    name_col: usize,
    code_col: Option<usize>,
    label: &str,
    diags: &mut Diagnostics,
) -> DuplicateReport {
    let mut report = DuplicateReport {
        duplicate_names: duplicated(table, name_col),
        ..Default::default()
    };
    if report.duplicate_names.is_empty() {
        return report;
    }

    let Some(code_col) = code_col else {
        report.residual = report.duplicate_names.clone();
        diags.push(
            Stage::Duplicates,
            DiagnosticKind::DuplicateNamesRemain,
            format!(
                "{label}: {} duplicated name(s) but no code column to disambiguate: {}",
                report.residual.len(),
                report.residual.join(", ")
            ),
        );
        return report;
    };

    let wanted: BTreeSet<String> = report
        .duplicate_names
        .iter()
        .map(|n| NameKey::parse(n).full())
        .collect();

    for row in 0..table.len() {
        let name = table.text(row, name_col);
        if !wanted.contains(&NameKey::parse(&name).full()) {
            continue;
        }
        let code = table.text(row, code_col);
        if code.is_empty() {
            report.unresolved += 1;
            continue;
        }
        table.set(row, name_col, Value::Text(format!("{name} ({code})")));
        report.renamed += 1;
    }

    report.residual = duplicated(table, name_col);
    if report.residual.is_empty() {
        debug!(
            source = label,
            names = report.duplicate_names.len(),
            renamed = report.renamed,
            "duplicate names resolved"
        );
    } else {
        diags.push(
            Stage::Duplicates,
            DiagnosticKind::DuplicateNamesRemain,
            format!(
                "{label}: duplicates remain after code disambiguation ({} unresolved row(s)): {}",
                report.unresolved,
                report.residual.join(", ")
            ),
        );
    }
    report
}

/// Names whose normalized full key occurs more than once, first spelling kept.
fn duplicated(table: &Table, name_col: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut first_spelling: Vec<String> = Vec::new();
    for row in 0..table.len() {
        let raw = table.text(row, name_col);
        let key = NameKey::parse(&raw);
        if key.is_empty() {
            continue;
        }
        let entry = counts.entry(key.full()).or_insert_with(|| {
            first_spelling.push(raw.clone());
            (first_spelling.len() - 1, 0)
        });
        entry.1 += 1;
    }
    let mut dups: Vec<(usize, String)> = counts
        .into_values()
        .filter(|(_, n)| *n > 1)
        .map(|(i, _)| (i, first_spelling[i].clone()))
        .collect();
    dups.sort_unstable();
    dups.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str)]) -> Table {
        let mut t = Table::new(vec!["wardname".into(), "wardcode".into()]);
        for (n, c) in rows {
            t.push_row(vec![Value::infer(n), Value::infer(c)]);
        }
        t
    }

    fn names(t: &Table) -> Vec<String> {
        (0..t.len()).map(|r| t.text(r, 0)).collect()
    }

    #[test]
    fn duplicates_get_code_suffix() {
        let mut t = table(&[("Kawo", "NISKNT04"), ("Gwale", "KNGW01"), ("Kawo", "NISNAS04")]);
        let mut diags = Diagnostics::new();
        let report = resolve_duplicates(&mut t, 0, Some(1), "tabular", &mut diags);

        assert_eq!(names(&t), vec!["Kawo (NISKNT04)", "Gwale", "Kawo (NISNAS04)"]);
        assert_eq!(report.duplicate_names, vec!["Kawo"]);
        assert_eq!(report.renamed, 2);
        assert!(report.residual.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn case_and_spacing_variants_count_as_duplicates() {
        let mut t = table(&[("Kawo", "A"), ("  KAWO ", "B")]);
        let report = resolve_duplicates(&mut t, 0, Some(1), "tabular", &mut Diagnostics::new());
        assert_eq!(report.renamed, 2);
        assert_eq!(names(&t), vec!["Kawo (A)", "KAWO (B)"]);
    }

    #[test]
    fn no_code_column_is_noop_with_warning() {
        let mut t = table(&[("Kawo", ""), ("Kawo", "")]);
        let mut diags = Diagnostics::new();
        let report = resolve_duplicates(&mut t, 0, None, "boundary", &mut diags);
        assert_eq!(names(&t), vec!["Kawo", "Kawo"]);
        assert_eq!(report.residual, vec!["Kawo"]);
        assert_eq!(diags.count(DiagnosticKind::DuplicateNamesRemain), 1);
    }

    #[test]
    fn empty_code_left_unresolved() {
        let mut t = table(&[("Kawo", "A"), ("Kawo", ""), ("Kawo", "")]);
        let mut diags = Diagnostics::new();
        let report = resolve_duplicates(&mut t, 0, Some(1), "tabular", &mut diags);
        assert_eq!(report.renamed, 1);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.residual, vec!["Kawo"]);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn shared_codes_leave_residual_warning() {
        let mut t = table(&[("Kawo", "X"), ("Kawo", "X")]);
        let mut diags = Diagnostics::new();
        let report = resolve_duplicates(&mut t, 0, Some(1), "tabular", &mut diags);
        assert_eq!(report.residual, vec!["Kawo (X)"]);
        assert_eq!(diags.count(DiagnosticKind::DuplicateNamesRemain), 1);
    }

    #[test]
    fn unique_names_untouched() {
        let mut t = table(&[("Kawo", "A"), ("Gwale", "B")]);
        let report = resolve_duplicates(&mut t, 0, Some(1), "tabular", &mut Diagnostics::new());
        assert_eq!(report, DuplicateReport::default());
        assert_eq!(names(&t), vec!["Kawo", "Gwale"]);
    }
}
