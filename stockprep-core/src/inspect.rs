//! Read-only profile of a raw table: shape, leading rows, missing counts per column.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::ingest::{DataError, DataIngestor, Stage};
use crate::data::schema::MISSING_MARKERS;
use crate::data::table::{Cell, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub preview: Vec<Vec<String>>,
}

/// Profile a raw CSV without modifying it.
pub fn inspect_csv(path: &Path, preview_rows: usize) -> Result<RawProfile, DataError> {
    let table = DataIngestor::new(Stage::Inspect).ingest_csv(path)?;
    Ok(profile(&table, preview_rows))
}

/// Count missing-marker cells per column and take the first `preview_rows` rows.
pub fn profile(table: &Table, preview_rows: usize) -> RawProfile {
    let is_missing = |cell: &Cell| match cell {
        Cell::Absent => true,
        Cell::Text(s) => MISSING_MARKERS.contains(&s.as_str()),
        _ => false,
    };

    let columns = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnProfile {
            name: name.clone(),
            missing: table.rows.iter().filter(|row| is_missing(&row[idx])).count(),
        })
        .collect();

    let preview = table
        .rows
        .iter()
        .take(preview_rows)
        .map(|row| row.iter().map(display_cell).collect())
        .collect();

    RawProfile {
        rows: table.height(),
        columns,
        preview,
    }
}

fn display_cell(cell: &Cell) -> String {
    match cell {
        Cell::Absent => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Date(d) => d.to_string(),
        Cell::Number(v) => v.to_string(),
    }
}

impl RawProfile {
    /// Plain-text report for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Shape: ({}, {}) (Rows, Columns)", self.rows, self.columns.len());

        let _ = writeln!(out, "\n--- First {} Rows ---", self.preview.len());
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let _ = writeln!(out, "{}", header.join(" | "));
        for row in &self.preview {
            let _ = writeln!(out, "{}", row.join(" | "));
        }

        let _ = writeln!(out, "\n--- Missing Values Count ---");
        let width = self.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for col in &self.columns {
            let _ = writeln!(out, "{:<width$} {:>8}", col.name, col.missing);
        }
        out
    }
}
