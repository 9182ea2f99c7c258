//! Parquet persistence for canonical and aggregate artifacts.
//!
//! Features:
//! - Atomic writes (write to `.tmp`, rename into place)
//! - Metadata sidecar per artifact (`{stem}.meta.json`: rows, columns, date range, blake3 hash)
//! - Schema validation when loading the canonical artifact

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::data::ingest::{DataError, Stage};
use crate::data::schema::{
    CanonicalRecord, CanonicalSchema, CanonicalTable, CLOSE_PRICE, OPEN_PRICE, SECTOR, TICKER,
    TRADE_DATE, VOLUME,
};
use crate::data::table::{Cell, Table};

/// Metadata sidecar for a persisted artifact.
///
/// Holds no wall-clock time, so rewriting identical data yields an identical sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub artifact: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub data_hash: String,
}

/// Path of the metadata sidecar for an artifact: `cleaned.parquet` → `cleaned.meta.json`.
pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub(crate) fn days_to_date(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(days as i64)
}

/// Build a polars Date column from optional dates.
pub(crate) fn date_column(name: &str, dates: Vec<Option<i32>>) -> Result<Column, DataError> {
    Column::new(name.into(), dates)
        .cast(&DataType::Date)
        .map_err(|e| DataError::ParquetError(format!("{name} cast: {e}")))
}

/// Convert a cleaned table to a DataFrame using the canonical dtypes.
pub fn table_to_dataframe(table: &Table) -> Result<DataFrame, DataError> {
    let mut columns = Vec::with_capacity(table.width());
    for (idx, name) in table.headers.iter().enumerate() {
        let cells = table.rows.iter().map(|row| &row[idx]);
        let column = match CanonicalSchema::dtype_of(name) {
            DataType::Date => {
                date_column(name, cells.map(|c| c.as_date().map(date_to_days)).collect())?
            }
            DataType::Float64 => {
                let values: Vec<Option<f64>> = cells.map(Cell::as_number).collect();
                Column::new(name.as_str().into(), values)
            }
            _ => {
                let values: Vec<Option<String>> = cells.map(cell_to_string).collect();
                Column::new(name.as_str().into(), values)
            }
        };
        columns.push(column);
    }
    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn cell_to_string(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Absent => None,
        Cell::Text(s) => Some(s.clone()),
        Cell::Date(d) => Some(d.to_string()),
        Cell::Number(v) => Some(v.to_string()),
    }
}

/// Write a DataFrame atomically and record its sidecar.
///
/// The sidecar is written before the data file is renamed into place. If the sidecar cannot be
/// written, the previous artifact stays as it was.
pub fn write_artifact(
    path: &Path,
    df: &mut DataFrame,
    date_range: Option<(NaiveDate, NaiveDate)>,
) -> Result<ArtifactMeta, DataError> {
    let write_err = |reason: String| DataError::WriteFailed {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(format!("create dir: {e}")))?;
    }

    let tmp_path = path.with_extension("parquet.tmp");
    let written = write_parquet(df, &tmp_path).and_then(|_| {
        fs::read(&tmp_path).map_err(|e| DataError::ParquetError(format!("re-read: {e}")))
    });
    let bytes = match written {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_err(e.to_string()));
        }
    };

    let meta = ArtifactMeta {
        artifact: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        rows: df.height(),
        columns: df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
        start_date: date_range.map(|(start, _)| start),
        end_date: date_range.map(|(_, end)| end),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
    };

    // Sidecar first: the data file is only published once its metadata is in place.
    if let Err(e) = write_meta(path, &meta) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(e.to_string()));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        let _ = fs::remove_file(meta_path(path));
        write_err(format!("atomic rename failed: {e}"))
    })?;

    debug!(path = %path.display(), rows = meta.rows, "wrote artifact");
    Ok(meta)
}

fn write_meta(path: &Path, meta: &ArtifactMeta) -> Result<(), DataError> {
    let target = meta_path(path);
    let tmp = target.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| DataError::ValidationError(format!("meta serialization: {e}")))?;
    fs::write(&tmp, json).map_err(|e| DataError::ParquetError(format!("meta write: {e}")))?;
    fs::rename(&tmp, &target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataError::ParquetError(format!("meta rename: {e}"))
    })
}

/// Read the sidecar of an artifact, if it exists and parses.
pub fn read_meta(path: &Path) -> Option<ArtifactMeta> {
    let content = fs::read_to_string(meta_path(path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Persist the cleaned table as the canonical artifact, overwriting any previous one.
pub fn persist_canonical(path: &Path, table: &Table) -> Result<ArtifactMeta, DataError> {
    let mut df = table_to_dataframe(table)?;
    let dates = table
        .column(TRADE_DATE)
        .into_iter()
        .flatten()
        .filter_map(Cell::as_date);
    let range = dates.fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    });
    write_artifact(path, &mut df, range)
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Read a Parquet artifact. A missing file is reported as a missing source for `stage`.
pub fn read_frame(path: &Path, stage: Stage) -> Result<DataFrame, DataError> {
    if !path.exists() {
        return Err(DataError::MissingSource {
            path: path.to_path_buf(),
            stage,
        });
    }
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))
}

/// Load the canonical artifact as typed records.
pub fn load_canonical(path: &Path) -> Result<CanonicalTable, DataError> {
    let df = read_frame(path, Stage::Aggregator)?;
    CanonicalSchema::validate(&df)?;
    dataframe_to_canonical(&df)
}

/// Convert a validated canonical DataFrame back to records.
pub fn dataframe_to_canonical(df: &DataFrame) -> Result<CanonicalTable, DataError> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let dates = df
        .column(TRADE_DATE)
        .and_then(|c| c.date().cloned())
        .map_err(|e| DataError::ParquetError(format!("trade_date column: {e}")))?;
    let text = |name: &str| -> Result<Option<StringChunked>, DataError> {
        match df.column(name) {
            Ok(c) => c
                .str()
                .cloned()
                .map(Some)
                .map_err(|e| DataError::ParquetError(format!("{name} column: {e}"))),
            Err(_) => Ok(None),
        }
    };
    let number = |name: &str| -> Result<Option<Float64Chunked>, DataError> {
        match df.column(name) {
            Ok(c) => c
                .f64()
                .cloned()
                .map(Some)
                .map_err(|e| DataError::ParquetError(format!("{name} column: {e}"))),
            Err(_) => Ok(None),
        }
    };

    let ticker = text(TICKER)?;
    let sector = text(SECTOR)?;
    let currency = text("currency")?;
    let exchange = text("exchange")?;
    let validated = text("validated")?;
    let notes = text("notes")?;
    let open = number(OPEN_PRICE)?;
    let close = number(CLOSE_PRICE)?;
    let volume = number(VOLUME)?;

    let get_text =
        |ca: &Option<StringChunked>, i: usize| ca.as_ref().and_then(|c| c.get(i)).map(String::from);
    let get_number = |ca: &Option<Float64Chunked>, i: usize| ca.as_ref().and_then(|c| c.get(i));

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = dates
            .get(i)
            .ok_or_else(|| DataError::ValidationError(format!("null trade_date at row {i}")))?;
        records.push(CanonicalRecord {
            trade_date: days_to_date(days),
            ticker: get_text(&ticker, i),
            sector: get_text(&sector, i),
            currency: get_text(&currency, i),
            exchange: get_text(&exchange, i),
            validated: get_text(&validated, i),
            notes: get_text(&notes, i),
            open_price: get_number(&open, i),
            close_price: get_number(&close, i),
            volume: get_number(&volume, i),
        });
    }

    Ok(CanonicalTable::new(columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned_table() -> Table {
        Table::new(
            vec![
                "trade_date".into(),
                "ticker".into(),
                "close_price".into(),
                "source".into(),
            ],
            vec![
                vec![
                    Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
                    Cell::Text("AAPL".into()),
                    Cell::Number(165.0),
                    Cell::Text("feed-a".into()),
                ],
                vec![
                    Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                    Cell::Absent,
                    Cell::Absent,
                    Cell::Absent,
                ],
            ],
        )
    }

    #[test]
    fn canonical_roundtrip_preserves_values_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");

        persist_canonical(&path, &cleaned_table()).unwrap();
        let loaded = load_canonical(&path).unwrap();

        assert_eq!(loaded.columns, vec!["trade_date", "ticker", "close_price", "source"]);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.records[0].ticker.as_deref(), Some("AAPL"));
        assert_eq!(loaded.records[0].close_price, Some(165.0));
        assert_eq!(loaded.records[1].ticker, None);
        assert_eq!(loaded.records[1].close_price, None);
        assert_eq!(loaded.records[1].volume, None);
        assert!(!loaded.has_column("volume"));
    }

    #[test]
    fn write_leaves_no_temp_file_and_records_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");

        let meta = persist_canonical(&path, &cleaned_table()).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("parquet.tmp").exists());
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(read_meta(&path), Some(meta));
    }

    #[test]
    fn sidecar_failure_leaves_previous_artifact_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");
        persist_canonical(&path, &cleaned_table()).unwrap();
        let before = fs::read(&path).unwrap();

        // a directory where the sidecar belongs makes the sidecar rename fail
        fs::remove_file(meta_path(&path)).unwrap();
        fs::create_dir(meta_path(&path)).unwrap();
        let empty = Table::new(vec!["trade_date".into()], vec![]);
        let err = persist_canonical(&path, &empty).unwrap_err();

        assert!(matches!(err, DataError::WriteFailed { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!path.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/cleaned.parquet");

        persist_canonical(&path, &cleaned_table()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn missing_canonical_is_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_canonical(&dir.path().join("nope.parquet")).unwrap_err();

        match err {
            DataError::MissingSource { stage, .. } => assert_eq!(stage, Stage::Aggregator),
            other => panic!("expected MissingSource, got {other:?}"),
        }
    }

    #[test]
    fn empty_table_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");
        let table = Table::new(vec!["trade_date".into(), "ticker".into()], vec![]);

        let meta = persist_canonical(&path, &table).unwrap();
        let loaded = load_canonical(&path).unwrap();

        assert_eq!(meta.rows, 0);
        assert_eq!(meta.start_date, None);
        assert!(loaded.is_empty());
    }

    #[test]
    fn days_conversion_roundtrips() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(days_to_date(date_to_days(date)), date);
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
    }
}
