//! The three aggregate views derived from the canonical table.
//!
//! Each view is computed independently and persisted to its own artifact.
//! Column names are a contract with the dashboard that reads these files:
//!
//! | view            | columns                                   |
//! |-----------------|-------------------------------------------|
//! | daily close     | `trade_date`, `ticker`, `close_price`     |
//! | sector volume   | `sector`, `avg_volume`                    |
//! | daily returns   | `trade_date`, `ticker`, `daily_return`    |

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::ingest::DataError;
use crate::data::schema::{CanonicalRecord, CanonicalTable, CLOSE_PRICE, SECTOR, TICKER, TRADE_DATE, VOLUME};
use crate::data::store::{date_column, date_to_days};

/// Identifies one of the aggregate views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    DailyClose,
    SectorVolume,
    DailyReturns,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::DailyClose, ViewKind::SectorVolume, ViewKind::DailyReturns];

    /// Output columns, in order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ViewKind::DailyClose => &[TRADE_DATE, TICKER, CLOSE_PRICE],
            ViewKind::SectorVolume => &[SECTOR, "avg_volume"],
            ViewKind::DailyReturns => &[TRADE_DATE, TICKER, "daily_return"],
        }
    }

    /// Canonical columns the view reads.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            ViewKind::DailyClose | ViewKind::DailyReturns => &[TRADE_DATE, TICKER, CLOSE_PRICE],
            ViewKind::SectorVolume => &[SECTOR, VOLUME],
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::DailyClose => write!(f, "daily close by ticker"),
            ViewKind::SectorVolume => write!(f, "sector volume"),
            ViewKind::DailyReturns => write!(f, "daily returns"),
        }
    }
}

/// Mean close per (`trade_date`, `ticker`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyClose {
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub close_price: f64,
}

/// Mean volume per sector. `None` when every volume in the sector is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorVolume {
    pub sector: String,
    pub avg_volume: Option<f64>,
}

/// Fractional close-to-close change against the previous observation of the same ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub daily_return: f64,
}

/// Running mean that ignores absent values.
#[derive(Debug, Clone, Copy, Default)]
struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Mean `close_price` per (`trade_date`, `ticker`), ordered by date then ticker.
///
/// Rows without a ticker are skipped. A group whose closes are all absent has no mean and
/// produces no row.
pub fn daily_close_by_ticker(table: &CanonicalTable) -> Result<Vec<DailyClose>, DataError> {
    let kind = ViewKind::DailyClose;
    table.require(&kind.to_string(), kind.required_columns())?;

    let mut groups: BTreeMap<(NaiveDate, &str), MeanAccumulator> = BTreeMap::new();
    for record in &table.records {
        let Some(ticker) = record.ticker.as_deref() else {
            continue;
        };
        groups
            .entry((record.trade_date, ticker))
            .or_default()
            .push(record.close_price);
    }

    Ok(groups
        .into_iter()
        .filter_map(|((trade_date, ticker), acc)| {
            acc.mean().map(|close_price| DailyClose {
                trade_date,
                ticker: ticker.to_string(),
                close_price,
            })
        })
        .collect())
}

/// Mean `volume` per sector, ordered by sector. Rows without a sector are skipped.
pub fn sector_volume(table: &CanonicalTable) -> Result<Vec<SectorVolume>, DataError> {
    let kind = ViewKind::SectorVolume;
    table.require(&kind.to_string(), kind.required_columns())?;

    let mut groups: BTreeMap<&str, MeanAccumulator> = BTreeMap::new();
    for record in &table.records {
        if let Some(sector) = record.sector.as_deref() {
            groups.entry(sector).or_default().push(record.volume);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(sector, acc)| SectorVolume {
            sector: sector.to_string(),
            avg_volume: acc.mean(),
        })
        .collect())
}

/// Close-to-close returns per ticker in chronological order.
///
/// Rows are stably sorted by (`ticker`, `trade_date`), so rows sharing a date keep the order
/// the Cleaner wrote them in. The first row of each ticker has no predecessor and is skipped,
/// as is any position where either close is absent or the previous close is zero.
pub fn daily_returns(table: &CanonicalTable) -> Result<Vec<DailyReturn>, DataError> {
    let kind = ViewKind::DailyReturns;
    table.require(&kind.to_string(), kind.required_columns())?;

    let mut ordered: Vec<(&str, &CanonicalRecord)> = table
        .records
        .iter()
        .filter_map(|r| r.ticker.as_deref().map(|t| (t, r)))
        .collect();
    ordered.sort_by(|(ta, a), (tb, b)| ta.cmp(tb).then(a.trade_date.cmp(&b.trade_date)));

    let mut returns = Vec::new();
    let (mut zero_base, mut non_finite) = (0usize, 0usize);
    for pair in ordered.windows(2) {
        let ((prev_ticker, prev), (ticker, current)) = (pair[0], pair[1]);
        if prev_ticker != ticker {
            continue;
        }
        let (Some(previous_close), Some(close)) = (prev.close_price, current.close_price) else {
            continue;
        };
        if previous_close == 0.0 {
            zero_base += 1;
            continue;
        }
        let daily_return = (close - previous_close) / previous_close;
        if daily_return.is_finite() {
            returns.push(DailyReturn {
                trade_date: current.trade_date,
                ticker: ticker.to_string(),
                daily_return,
            });
        } else {
            non_finite += 1;
        }
    }
    if zero_base > 0 || non_finite > 0 {
        debug!(zero_base, non_finite, "daily return positions skipped");
    }
    Ok(returns)
}

/// All three views computed from one canonical table, each with its own outcome.
#[derive(Debug)]
pub struct ComputedViews {
    pub daily_close: Result<Vec<DailyClose>, DataError>,
    pub sector_volume: Result<Vec<SectorVolume>, DataError>,
    pub daily_returns: Result<Vec<DailyReturn>, DataError>,
}

impl ComputedViews {
    pub fn compute(table: &CanonicalTable) -> Self {
        Self {
            daily_close: daily_close_by_ticker(table),
            sector_volume: sector_volume(table),
            daily_returns: daily_returns(table),
        }
    }
}

// ── DataFrame conversion ────────────────────────────────────────────

fn frame(columns: Vec<Column>) -> Result<DataFrame, DataError> {
    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

pub fn daily_close_frame(rows: &[DailyClose]) -> Result<DataFrame, DataError> {
    frame(vec![
        date_column(TRADE_DATE, rows.iter().map(|r| Some(date_to_days(r.trade_date))).collect())?,
        Column::new(TICKER.into(), rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>()),
        Column::new(CLOSE_PRICE.into(), rows.iter().map(|r| r.close_price).collect::<Vec<_>>()),
    ])
}

pub fn sector_volume_frame(rows: &[SectorVolume]) -> Result<DataFrame, DataError> {
    frame(vec![
        Column::new(SECTOR.into(), rows.iter().map(|r| r.sector.as_str()).collect::<Vec<_>>()),
        Column::new("avg_volume".into(), rows.iter().map(|r| r.avg_volume).collect::<Vec<_>>()),
    ])
}

pub fn daily_returns_frame(rows: &[DailyReturn]) -> Result<DataFrame, DataError> {
    frame(vec![
        date_column(TRADE_DATE, rows.iter().map(|r| Some(date_to_days(r.trade_date))).collect())?,
        Column::new(TICKER.into(), rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>()),
        Column::new("daily_return".into(), rows.iter().map(|r| r.daily_return).collect::<Vec<_>>()),
    ])
}
