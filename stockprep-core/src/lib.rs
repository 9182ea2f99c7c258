//! stockprep core: cleaning and aggregation pipelines for raw stock-market tables.
//!
//! This crate contains:
//! - Raw CSV ingestion into an untyped working table
//! - The Cleaner: header normalization, missing-marker standardization, string cleaning,
//!   date parsing, numeric coercion, deduplication
//! - The Aggregator: daily close by ticker, sector volume, daily returns
//! - Parquet persistence with atomic writes and metadata sidecars
//! - TOML pipeline configuration and a raw-data profile

pub mod config;
pub mod data;
pub mod inspect;
pub mod pipeline;
pub mod views;

pub use config::{ConfigError, PipelineConfig};
pub use data::{DataError, Stage};
pub use pipeline::{run_aggregator, run_cleaner, AggregateSummary, CleanSummary, ViewOutcome};
pub use views::ViewKind;
