use polars::prelude::*;

use crate::data::ingest::DataError;

pub const TRADE_DATE: &str = "trade_date";
pub const TICKER: &str = "ticker";
pub const SECTOR: &str = "sector";
pub const OPEN_PRICE: &str = "open_price";
pub const CLOSE_PRICE: &str = "close_price";
pub const VOLUME: &str = "volume";

/// Text columns that are trimmed and upper-cased.
pub const STRING_COLUMNS: [&str; 6] = [TICKER, SECTOR, "currency", "exchange", "validated", "notes"];

/// Columns coerced to floating point.
pub const NUMERIC_COLUMNS: [&str; 3] = [OPEN_PRICE, CLOSE_PRICE, VOLUME];

/// Exact spellings replaced by the absent marker before any typed coercion.
pub const MISSING_MARKERS: [&str; 8] = ["", "NA", "N/A", "null", "NaN", "nan", "-", "na"];

/// Expected schema for canonical data
pub struct CanonicalSchema;

impl CanonicalSchema {
    /// Every column the canonical schema knows about.
    pub fn known_columns() -> impl Iterator<Item = &'static str> {
        std::iter::once(TRADE_DATE)
            .chain(STRING_COLUMNS)
            .chain(NUMERIC_COLUMNS)
    }

    pub fn is_known(name: &str) -> bool {
        Self::known_columns().any(|c| c == name)
    }

    /// Storage dtype of a canonical column. Unknown columns pass through as strings.
    pub fn dtype_of(name: &str) -> DataType {
        if name == TRADE_DATE {
            DataType::Date
        } else if NUMERIC_COLUMNS.contains(&name) {
            DataType::Float64
        } else {
            DataType::String
        }
    }

    /// Validate a DataFrame read back from a canonical artifact.
    ///
    /// `trade_date` must exist; every other known column present must carry its canonical dtype.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let actual = df.schema();

        if !actual.contains(TRADE_DATE) {
            return Err(SchemaError::MissingColumn(TRADE_DATE.to_string()));
        }

        for name in Self::known_columns() {
            let Some(actual_dtype) = actual.get(name) else {
                continue;
            };
            let expected = Self::dtype_of(name);
            if actual_dtype != &expected {
                return Err(SchemaError::TypeMismatch {
                    column: name.to_string(),
                    expected,
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

/// One typed row of the canonical artifact. Pass-through columns are not carried.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub trade_date: chrono::NaiveDate,
    pub ticker: Option<String>,
    pub sector: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub validated: Option<String>,
    pub notes: Option<String>,
    pub open_price: Option<f64>,
    pub close_price: Option<f64>,
    pub volume: Option<f64>,
}

impl CanonicalRecord {
    /// A record with only a date set; convenient for building fixtures.
    pub fn dated(trade_date: chrono::NaiveDate) -> Self {
        Self {
            trade_date,
            ticker: None,
            sector: None,
            currency: None,
            exchange: None,
            validated: None,
            notes: None,
            open_price: None,
            close_price: None,
            volume: None,
        }
    }
}

/// The canonical artifact as loaded by the Aggregator.
///
/// `columns` lists the columns physically present, so a consumer can tell an
/// all-null column apart from one the Cleaner never saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    pub columns: Vec<String>,
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    pub fn new(columns: Vec<String>, records: Vec<CanonicalRecord>) -> Self {
        Self { columns, records }
    }

    /// A table that has every known column.
    pub fn with_all_columns(records: Vec<CanonicalRecord>) -> Self {
        Self {
            columns: CanonicalSchema::known_columns().map(String::from).collect(),
            records,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Fail with the first of `required` that is not present.
    pub fn require(&self, context: &str, required: &[&str]) -> Result<(), DataError> {
        match required.iter().find(|c| !self.has_column(c)) {
            Some(column) => Err(DataError::MissingColumn {
                column: column.to_string(),
                context: context.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
