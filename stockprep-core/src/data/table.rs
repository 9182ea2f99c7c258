//! In-memory working table shared by every Cleaner stage.
//!
//! Rows are stored in input order and every row has exactly one cell per
//! header. A cell that holds no value is always [`Cell::Absent`]; no stage
//! is allowed to represent missingness any other way.

use chrono::NaiveDate;

/// A single table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// The canonical absent-value marker.
    Absent,
    Text(String),
    Date(NaiveDate),
    Number(f64),
}

impl Cell {
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Hashable identity of the cell, used for full-row duplicate detection.
    pub(crate) fn key(&self) -> CellKey<'_> {
        match self {
            Cell::Absent => CellKey::Absent,
            Cell::Text(s) => CellKey::Text(s),
            Cell::Date(d) => CellKey::Date(*d),
            // -0.0 and 0.0 compare equal, so they must hash equal too
            Cell::Number(v) if *v == 0.0 => CellKey::Number(0.0f64.to_bits()),
            Cell::Number(v) => CellKey::Number(v.to_bits()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) enum CellKey<'a> {
    Absent,
    Text(&'a str),
    Date(NaiveDate),
    Number(u64),
}

/// Ordered headers plus row-major cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Build a table of text cells, mostly for tests and fixtures.
    pub fn from_text(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| Cell::Text(v.to_string())).collect())
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Replace every cell of column `idx` with `f(cell)`.
    pub fn map_column(&mut self, idx: usize, mut f: impl FnMut(Cell) -> Cell) {
        for row in &mut self.rows {
            let cell = std::mem::replace(&mut row[idx], Cell::Absent);
            row[idx] = f(cell);
        }
    }

    /// Remove the columns at `indices`, keeping the order of the rest.
    pub fn drop_columns(&mut self, indices: &[usize]) {
        let keep = |i: &usize| !indices.contains(i);
        self.headers = self
            .headers
            .drain(..)
            .enumerate()
            .filter(|(i, _)| keep(i))
            .map(|(_, h)| h)
            .collect();
        for row in &mut self.rows {
            *row = row
                .drain(..)
                .enumerate()
                .filter(|(i, _)| keep(i))
                .map(|(_, c)| c)
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_hashes_like_zero() {
        assert_eq!(Cell::Number(-0.0).key(), Cell::Number(0.0).key());
        assert_ne!(Cell::Number(1.0).key(), Cell::Number(0.0).key());
    }

    #[test]
    fn map_column_touches_only_that_column() {
        let mut table = Table::from_text(&["a", "b"], &[&["x", "y"], &["z", "w"]]);
        table.map_column(1, |_| Cell::Absent);

        assert_eq!(table.rows[0][0], Cell::Text("x".into()));
        assert!(table.rows[0][1].is_absent());
        assert!(table.rows[1][1].is_absent());
    }

    #[test]
    fn drop_columns_keeps_remaining_order() {
        let mut table = Table::from_text(&["a", "b", "c"], &[&["1", "2", "3"]]);
        table.drop_columns(&[0, 2]);

        assert_eq!(table.headers, vec!["b".to_string()]);
        assert_eq!(table.rows[0], vec![Cell::Text("2".into())]);
    }
}
