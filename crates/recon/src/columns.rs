use geofuse_core::Table;
use tracing::debug;

/// A detected identifier column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPick {
    pub index: usize,
    pub name: String,
    /// Picked by the cardinality fallback rather than a known name.
    pub synthetic: bool,
}

/// First candidate (in priority order) present in the header, case-insensitive.
pub fn find_candidate(table: &Table, candidates: &[String], exclude: Option<usize>) -> Option<ColumnPick> {
    candidates.iter().find_map(|c| {
        table
            .find_column_ci(c)
            .filter(|&i| Some(i) != exclude)
            .map(|index| ColumnPick {
                index,
                name: table.columns[index].clone(),
                synthetic: false,
            })
    })
}

pub fn detect_code_column(table: &Table, candidates: &[String]) -> Option<ColumnPick> {
    find_candidate(table, candidates, None)
}

/// Name column by candidate list, else the first text column whose distinct
/// count exceeds `ratio` of the row count.
pub fn detect_name_column(
    table: &Table,
    candidates: &[String],
    ratio: f64,
    exclude: Option<usize>,
) -> Option<ColumnPick> {
    if let Some(pick) = find_candidate(table, candidates, exclude) {
        return Some(pick);
    }
    if table.is_empty() {
        return None;
    }

    let needed = ratio * table.len() as f64;
    let pick = (0..table.width())
        .filter(|&i| Some(i) != exclude)
        .find(|&i| table.is_text_column(i) && table.distinct_count(i) as f64 > needed)
        .map(|index| ColumnPick {
            index,
            name: table.columns[index].clone(),
            synthetic: true,
        });
    if let Some(p) = &pick {
        debug!(column = %p.name, "using high-cardinality text column as identifier");
    }
    pick
}
