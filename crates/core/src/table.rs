use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::value::Value;

static NULL_VALUE: Value = Value::Null;

/// Header + rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding with nulls or truncating to the header width.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Case-insensitive, whitespace-trimmed header lookup.
    pub fn find_column_ci(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
    }

    pub fn get(&self, row: usize, col: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_VALUE)
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    /// Cell rendered as trimmed text; nulls become the empty string.
    pub fn text(&self, row: usize, col: usize) -> String {
        self.get(row, col).to_string().trim().to_string()
    }

    pub fn column_values(&self, col: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |r| r.get(col).unwrap_or(&NULL_VALUE))
    }

    /// True when the column holds at least one value and every non-null value is text.
    pub fn is_text_column(&self, col: usize) -> bool {
        let mut seen = false;
        for v in self.column_values(col) {
            match v {
                Value::Null => {}
                Value::Text(_) => seen = true,
                _ => return false,
            }
        }
        seen
    }

    /// Number of distinct non-null values (compared by their text form).
    pub fn distinct_count(&self, col: usize) -> usize {
        self.column_values(col)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn rename_column(&mut self, col: usize, name: impl Into<String>) {
        if let Some(c) = self.columns.get_mut(col) {
            *c = name.into();
        }
    }
}

/// Boundary attributes plus one optional geometry per row.
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    pub table: Table,
    pub geometries: Vec<Option<Geometry>>,
}

impl GeoTable {
    pub fn new(table: Table, mut geometries: Vec<Option<Geometry>>) -> Self {
        geometries.resize(table.len(), None);
        Self { table, geometries }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
