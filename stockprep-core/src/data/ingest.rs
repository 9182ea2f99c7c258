use crate::data::table::{Cell, Table};
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pipeline stage that needed an artifact, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cleaner,
    Aggregator,
    Inspect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Cleaner => write!(f, "cleaner"),
            Stage::Aggregator => write!(f, "aggregator"),
            Stage::Inspect => write!(f, "inspect"),
        }
    }
}

/// Raw CSV ingestor.
///
/// Every field is read as text; typing happens later in the Cleaner.
/// Short rows are padded with empty fields, long rows are truncated.
/// Bytes that are not valid UTF-8 become U+FFFD instead of failing the read.
pub struct DataIngestor {
    stage: Stage,
}

impl DataIngestor {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    /// Ingest a comma-delimited file with a header row.
    pub fn ingest_csv(&self, path: &Path) -> Result<Table, DataError> {
        if !path.exists() {
            return Err(DataError::MissingSource {
                path: path.to_path_buf(),
                stage: self.stage,
            });
        }
        let file = File::open(path).map_err(|e| DataError::IngestFailed(format!("open: {e}")))?;
        self.ingest_reader(file)
    }

    /// Ingest CSV from any reader.
    pub fn ingest_reader<R: std::io::Read>(&self, reader: R) -> Result<Table, DataError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut lossy = 0usize;
        let mut decode = |raw: &[u8]| match String::from_utf8_lossy(raw) {
            Cow::Borrowed(s) => s.to_string(),
            Cow::Owned(s) => {
                lossy += 1;
                s
            }
        };

        let headers: Vec<String> = rdr
            .byte_headers()
            .map_err(|e| DataError::IngestFailed(format!("header row: {e}")))?
            .iter()
            .map(&mut decode)
            .collect();
        let width = headers.len();

        let mut rows = Vec::new();
        let mut ragged = 0usize;
        for (i, record) in rdr.byte_records().enumerate() {
            let record =
                record.map_err(|e| DataError::IngestFailed(format!("record {}: {e}", i + 1)))?;
            if record.len() != width {
                ragged += 1;
            }
            let mut row: Vec<Cell> = record
                .iter()
                .take(width)
                .map(|v| Cell::Text(decode(v)))
                .collect();
            row.resize(width, Cell::Text(String::new()));
            rows.push(row);
        }

        if ragged > 0 {
            warn!(ragged, width, "rows with a field count different from the header were padded or truncated");
        }
        if lossy > 0 {
            warn!(fields = lossy, "fields with invalid UTF-8 decoded with replacement characters");
        }
        debug!(rows = rows.len(), columns = width, "ingested raw csv");

        Ok(Table::new(headers, rows))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("{stage}: required input '{}' not found", path.display())]
    MissingSource { path: PathBuf, stage: Stage },

    #[error("Ingest failed: {0}")]
    IngestFailed(String),

    #[error("Missing required column '{column}' for {context}")]
    MissingColumn { column: String, context: String },

    #[error("Header collision: {raw:?} all normalize to '{normalized}'")]
    HeaderCollision { normalized: String, raw: Vec<String> },

    #[error("Parquet error: {0}")]
    ParquetError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Write failed for '{}': {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error(transparent)]
    Schema(#[from] crate::data::schema::SchemaError),
}

impl DataError {
    /// True when the error means an input artifact does not exist.
    pub fn is_missing_source(&self) -> bool {
        matches!(self, DataError::MissingSource { .. })
    }
}
