//! stockprep CLI: clean, aggregate, run and inspect commands.
//!
//! Commands:
//! - `clean`: raw CSV → canonical Parquet
//! - `aggregate`: canonical Parquet → three view artifacts
//! - `run`: `clean` followed by `aggregate`
//! - `inspect`: shape, preview and missing counts of the raw CSV
//!
//! Exit status: 0 on success, 2 when an input artifact is missing, 1 on any other failure.

mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use stockprep_core::data::CleanReport;
use stockprep_core::{inspect, run_aggregator, run_cleaner, DataError, PipelineConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "stockprep",
    about = "stockprep CLI: clean raw stock tables and build summary views"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PathArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raw CSV input. Overrides the config file.
    #[arg(long)]
    raw: Option<PathBuf>,

    /// Canonical Parquet artifact. Overrides the config file.
    #[arg(long)]
    canonical: Option<PathBuf>,

    /// Directory for the three view artifacts. Overrides the config file.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl PathArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(raw) = &self.raw {
            config.paths.raw = raw.clone();
        }
        if let Some(canonical) = &self.canonical {
            config.paths.canonical = canonical.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.paths.place_views_in(dir);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw CSV into the canonical Parquet artifact.
    Clean(PathArgs),
    /// Build the three aggregate views from the canonical artifact.
    Aggregate(PathArgs),
    /// Run clean, then aggregate.
    Run(PathArgs),
    /// Report shape, leading rows and missing counts of the raw CSV.
    Inspect {
        #[command(flatten)]
        paths: PathArgs,

        /// Number of rows to preview.
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let outcome = match &cli.command {
        Commands::Clean(paths) => paths.resolve().and_then(|c| clean_cmd(&c)),
        Commands::Aggregate(paths) => paths.resolve().and_then(|c| aggregate_cmd(&c)),
        Commands::Run(paths) => paths
            .resolve()
            .and_then(|c| clean_cmd(&c).and_then(|_| aggregate_cmd(&c))),
        Commands::Inspect { paths, rows } => paths.resolve().and_then(|c| inspect_cmd(&c, *rows)),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            exit_code_for(&e)
        }
    }
}

/// Missing inputs get their own status so callers can tell them apart from other failures.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<DataError>() {
        Some(e) if e.is_missing_source() => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn clean_cmd(config: &PipelineConfig) -> Result<()> {
    let summary = run_cleaner(config)?;
    print_clean_report(&summary.report);
    info!(
        "Success! Cleaned data saved to {} ({} rows)",
        summary.output.display(),
        summary.meta.rows
    );
    Ok(())
}

fn aggregate_cmd(config: &PipelineConfig) -> Result<()> {
    let summary = run_aggregator(config)?;
    for (i, outcome) in summary.outcomes.iter().enumerate() {
        if let Ok(meta) = &outcome.result {
            info!(
                "{}. Saved {} ({} rows)",
                i + 1,
                outcome.path.display(),
                meta.rows
            );
        }
    }

    let failed: Vec<String> = summary
        .failures()
        .map(|o| o.kind.to_string())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("{} of 3 views failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn inspect_cmd(config: &PipelineConfig, rows: usize) -> Result<()> {
    let profile = inspect::inspect_csv(&config.paths.raw, rows)?;
    println!("{}", profile.render());
    Ok(())
}

fn print_clean_report(report: &CleanReport) {
    info!(
        raw_rows = report.raw_rows,
        markers = report.markers_standardized,
        date_failures = report.date_parse_failures,
        dropped_no_date = report.rows_dropped_no_date,
        numeric_failures = report.numeric_parse_failures,
        duplicates = report.duplicates_removed,
        canonical_rows = report.canonical_rows,
        "clean report"
    );
    if !report.unknown_columns.is_empty() {
        info!(columns = ?report.unknown_columns, "passed through unknown columns");
    }
}
