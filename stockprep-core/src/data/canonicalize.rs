//! Cleaner stages: raw table → canonical table.
//!
//! Each stage is an explicit pass over an ordered list of columns and rows.
//! [`Canonicalizer::clean`] applies them in the required order:
//!
//! 1. normalize headers (stable names for every later lookup)
//! 2. standardize missing markers (whole table, before any typing)
//! 3. clean designated string columns
//! 4. parse `trade_date` and drop rows without a date
//! 5. coerce numeric columns
//! 6. drop full-row duplicates

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::ingest::DataError;
use crate::data::schema::{
    CanonicalSchema, MISSING_MARKERS, NUMERIC_COLUMNS, STRING_COLUMNS, TRADE_DATE,
};
use crate::data::table::{Cell, Table};

/// What to do when two raw headers normalize to the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the right-most column, drop the others, log a warning.
    #[default]
    KeepLast,
    /// Abort the run.
    Reject,
}

/// Counters collected while cleaning. Nothing here is fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub raw_rows: usize,
    pub markers_standardized: usize,
    pub date_parse_failures: usize,
    pub rows_dropped_no_date: usize,
    pub numeric_parse_failures: usize,
    pub duplicates_removed: usize,
    pub canonical_rows: usize,
    pub unknown_columns: Vec<String>,
    pub header_collisions: Vec<String>,
}

/// Canonicalizer for raw stock tables
pub struct Canonicalizer {
    collision_policy: CollisionPolicy,
}

impl Canonicalizer {
    pub fn new(collision_policy: CollisionPolicy) -> Self {
        Self { collision_policy }
    }

    /// Run every stage in order.
    pub fn clean(&self, table: Table) -> Result<(Table, CleanReport), DataError> {
        let mut report = CleanReport {
            raw_rows: table.height(),
            ..CleanReport::default()
        };

        let mut table = self.apply_headers(table, &mut report)?;
        report.markers_standardized = standardize_missing(&mut table);
        report.markers_standardized += clean_strings(&mut table, &STRING_COLUMNS);

        let dates = parse_dates(&mut table)?;
        report.date_parse_failures = dates.parse_failures;
        report.rows_dropped_no_date = dates.rows_dropped;

        report.numeric_parse_failures = coerce_numeric(&mut table, &NUMERIC_COLUMNS);
        report.duplicates_removed = deduplicate(&mut table);
        report.canonical_rows = table.height();

        info!(
            raw_rows = report.raw_rows,
            canonical_rows = report.canonical_rows,
            duplicates_removed = report.duplicates_removed,
            "Removed {} duplicate rows",
            report.duplicates_removed
        );
        Ok((table, report))
    }

    /// Rename headers, resolve collisions, and flag columns outside the known set.
    fn apply_headers(&self, mut table: Table, report: &mut CleanReport) -> Result<Table, DataError> {
        let raw = table.headers.clone();
        table.headers = normalize_headers(&raw);

        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, name) in table.headers.iter().enumerate() {
            positions.entry(name.as_str()).or_default().push(i);
        }

        let mut shadowed = Vec::new();
        let mut collided: Vec<(String, Vec<String>)> = positions
            .into_iter()
            .filter(|(_, idx)| idx.len() > 1)
            .map(|(name, idx)| {
                let sources = idx.iter().map(|&i| raw[i].clone()).collect();
                shadowed.extend(idx[..idx.len() - 1].iter().copied());
                (name.to_string(), sources)
            })
            .collect();
        collided.sort();

        if let Some((normalized, sources)) = collided.first() {
            if self.collision_policy == CollisionPolicy::Reject {
                return Err(DataError::HeaderCollision {
                    normalized: normalized.clone(),
                    raw: sources.clone(),
                });
            }
        }
        for (normalized, sources) in &collided {
            warn!(column = %normalized, raw = ?sources, "header collision, keeping the last column");
            report.header_collisions.push(normalized.clone());
        }
        table.drop_columns(&shadowed);

        for name in &table.headers {
            if !CanonicalSchema::is_known(name) {
                warn!(column = %name, "column outside the canonical schema passes through unchanged");
                report.unknown_columns.push(name.clone());
            }
        }
        info!(headers = ?table.headers, "normalized headers");
        Ok(table)
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(CollisionPolicy::default())
    }
}

/// Normalize one header: trim, lowercase, spaces to underscores, then keep word characters only.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h)).collect()
}

/// Replace every cell that exactly matches a missing-marker spelling. Returns the count replaced.
pub fn standardize_missing(table: &mut Table) -> usize {
    let mut replaced = 0;
    for row in &mut table.rows {
        for cell in row.iter_mut() {
            if matches!(cell, Cell::Text(s) if MISSING_MARKERS.contains(&s.as_str())) {
                *cell = Cell::Absent;
                replaced += 1;
            }
        }
    }
    debug!(replaced, "standardized missing markers");
    replaced
}

/// Trim and upper-case the designated text columns that are present. Returns the count of
/// values that turned out to be missing markers.
///
/// A padded marker (`" NA "`) only matches once trimmed, and a value that upper-cases to `NAN`
/// is a stringified missing value; both go back to absent.
pub fn clean_strings(table: &mut Table, columns: &[&str]) -> usize {
    let mut late_markers = 0;
    for name in columns {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        table.map_column(idx, |cell| match cell {
            Cell::Text(s) => {
                let trimmed = s.trim();
                let cleaned = trimmed.to_uppercase();
                if cleaned == "NAN" || MISSING_MARKERS.contains(&trimmed) {
                    late_markers += 1;
                    Cell::Absent
                } else {
                    Cell::Text(cleaned)
                }
            }
            other => other,
        });
    }
    if late_markers > 0 {
        debug!(late_markers, "padded or stringified missing markers set to absent");
    }
    late_markers
}

/// Outcome of [`parse_dates`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateParseOutcome {
    pub parse_failures: usize,
    pub rows_dropped: usize,
}

/// Parse `trade_date` into calendar dates and drop every row left without one.
pub fn parse_dates(table: &mut Table) -> Result<DateParseOutcome, DataError> {
    let idx = table
        .column_index(TRADE_DATE)
        .ok_or_else(|| DataError::MissingColumn {
            column: TRADE_DATE.to_string(),
            context: "cleaner date parsing".to_string(),
        })?;

    let mut outcome = DateParseOutcome::default();
    table.map_column(idx, |cell| match cell {
        Cell::Text(s) => match parse_date(&s) {
            Some(date) => Cell::Date(date),
            None => {
                outcome.parse_failures += 1;
                Cell::Absent
            }
        },
        Cell::Number(_) => {
            outcome.parse_failures += 1;
            Cell::Absent
        }
        other => other,
    });

    let before = table.height();
    table.rows.retain(|row| !row[idx].is_absent());
    outcome.rows_dropped = before - table.height();

    if outcome.parse_failures > 0 {
        warn!(failures = outcome.parse_failures, "unparseable trade dates set to absent");
    }
    debug!(dropped = outcome.rows_dropped, "dropped rows without a trade date");
    Ok(outcome)
}

const DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%m/%d/%Y", "%d-%b-%Y", "%b %d, %Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date or date-time string; the time of day is discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Coerce the given numeric columns to floats. Returns the number of cells that failed to parse.
pub fn coerce_numeric(table: &mut Table, columns: &[&str]) -> usize {
    let mut failures = 0;
    for name in columns {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        table.map_column(idx, |cell| match cell {
            Cell::Text(s) => match parse_number(&s) {
                Some(v) => Cell::Number(v),
                None => {
                    failures += 1;
                    Cell::Absent
                }
            },
            Cell::Date(_) => {
                failures += 1;
                Cell::Absent
            }
            other => other,
        });
    }
    if failures > 0 {
        warn!(failures, "non-numeric values set to absent");
    }
    failures
}

/// Parse a float; NaN counts as absent.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Drop rows identical across every column, keeping the first. Returns the count removed.
pub fn deduplicate(table: &mut Table) -> usize {
    let before = table.height();
    let mut seen = HashSet::with_capacity(before);
    let mut keep = Vec::with_capacity(before);
    for row in &table.rows {
        let key: Vec<_> = row.iter().map(Cell::key).collect();
        keep.push(seen.insert(key));
    }
    drop(seen);

    let mut flags = keep.into_iter();
    table.rows.retain(|_| flags.next().unwrap_or(false));
    before - table.height()
}
