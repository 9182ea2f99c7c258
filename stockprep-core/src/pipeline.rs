//! Cleaner and Aggregator runs. Wires ingestion, stages, views and storage together.
//!
//! Two entry points, each a full batch run that reads one artifact and overwrites its outputs:
//! - `run_cleaner()`: raw CSV → canonical Parquet.
//! - `run_aggregator()`: canonical Parquet → three view artifacts.
//!
//! A missing input aborts before anything is written. Views are independent: a failure while
//! computing or writing one is recorded in its [`ViewOutcome`] and the others still run.

use std::path::PathBuf;

use tracing::{error, info};

use crate::config::{PathsConfig, PipelineConfig};
use crate::data::canonicalize::{Canonicalizer, CleanReport};
use crate::data::ingest::{DataError, DataIngestor, Stage};
use crate::data::schema::CanonicalSchema;
use crate::data::store::{self, ArtifactMeta};
use crate::views::{self, ComputedViews, ViewKind};

/// Result of a Cleaner run.
#[derive(Debug, Clone)]
pub struct CleanSummary {
    pub report: CleanReport,
    pub output: PathBuf,
    pub meta: ArtifactMeta,
}

/// Run the Cleaner end to end.
pub fn run_cleaner(config: &PipelineConfig) -> Result<CleanSummary, DataError> {
    let paths = &config.paths;
    info!(raw = %paths.raw.display(), "starting data cleaning");

    let raw = DataIngestor::new(Stage::Cleaner).ingest_csv(&paths.raw)?;
    let (table, report) = Canonicalizer::new(config.cleaning.header_collision).clean(raw)?;

    let dtypes: Vec<String> = table
        .headers
        .iter()
        .map(|h| format!("{h}: {}", CanonicalSchema::dtype_of(h)))
        .collect();
    info!(columns = ?dtypes, "final types");

    let meta = store::persist_canonical(&paths.canonical, &table)?;
    info!(
        path = %paths.canonical.display(),
        rows = meta.rows,
        "cleaned data saved"
    );

    Ok(CleanSummary {
        report,
        output: paths.canonical.clone(),
        meta,
    })
}

/// Per-view result of an Aggregator run.
#[derive(Debug)]
pub struct ViewOutcome {
    pub kind: ViewKind,
    pub path: PathBuf,
    pub result: Result<ArtifactMeta, DataError>,
}

/// Result of an Aggregator run.
#[derive(Debug)]
pub struct AggregateSummary {
    pub input_rows: usize,
    pub outcomes: Vec<ViewOutcome>,
}

impl AggregateSummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ViewOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Run the Aggregator end to end.
pub fn run_aggregator(config: &PipelineConfig) -> Result<AggregateSummary, DataError> {
    let paths = &config.paths;
    info!(canonical = %paths.canonical.display(), "starting aggregations");

    let table = store::load_canonical(&paths.canonical)?;
    let computed = ComputedViews::compute(&table);

    Ok(AggregateSummary {
        input_rows: table.len(),
        outcomes: persist_all(paths, computed),
    })
}

/// Persist every view, attempting each write even if an earlier view failed.
pub fn persist_all(paths: &PathsConfig, computed: ComputedViews) -> Vec<ViewOutcome> {
    let ComputedViews {
        daily_close,
        sector_volume,
        daily_returns,
    } = computed;

    let frames = [
        (ViewKind::DailyClose, daily_close.and_then(|rows| views::daily_close_frame(&rows))),
        (ViewKind::SectorVolume, sector_volume.and_then(|rows| views::sector_volume_frame(&rows))),
        (ViewKind::DailyReturns, daily_returns.and_then(|rows| views::daily_returns_frame(&rows))),
    ];

    frames
        .into_iter()
        .map(|(kind, frame)| {
            let path = paths.view_path(kind).to_path_buf();
            let result = frame.and_then(|mut df| store::write_artifact(&path, &mut df, None));
            match &result {
                Ok(meta) => info!(view = %kind, path = %path.display(), rows = meta.rows, "saved view"),
                Err(e) => error!(view = %kind, path = %path.display(), error = %e, "view failed"),
            }
            ViewOutcome { kind, path, result }
        })
        .collect()
}
