//! Integration tests for the Aggregator run, driven from raw CSV through the Cleaner.

use chrono::NaiveDate;
use polars::prelude::*;
use stockprep_core::data::store::{read_frame, write_artifact};
use stockprep_core::{run_aggregator, run_cleaner, DataError, PipelineConfig, Stage, ViewKind};
use tempfile::TempDir;

fn setup(raw: &str) -> (TempDir, PipelineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("stock_market.csv");
    std::fs::write(&raw_path, raw).unwrap();

    let mut config = PipelineConfig::default();
    config.paths.raw = raw_path;
    config.paths.canonical = dir.path().join("cleaned.parquet");
    config.paths.place_views_in(&dir.path().join("views"));
    (dir, config)
}

fn run_both(config: &PipelineConfig) {
    run_cleaner(config).unwrap();
    let summary = run_aggregator(config).unwrap();
    assert!(summary.all_succeeded(), "{:?}", summary.outcomes);
}

fn view(config: &PipelineConfig, kind: ViewKind) -> DataFrame {
    read_frame(config.paths.view_path(kind), Stage::Aggregator).unwrap()
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

fn days(date: NaiveDate) -> i32 {
    (date - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32
}

#[test]
fn mixed_case_ticker_yields_one_return_row() {
    let (_dir, config) = setup(
        "Trade Date,Ticker,Sector,Open Price,Close Price,Volume\n\
         2024-01-02,aapl,Tech,110,150,1000\n\
         2024-01-03,AAPL,TECH,151,165,1200\n",
    );
    run_both(&config);

    let returns = view(&config, ViewKind::DailyReturns);
    assert_eq!(column_names(&returns), vec!["trade_date", "ticker", "daily_return"]);
    assert_eq!(returns.height(), 1);

    let tickers = returns.column("ticker").unwrap().str().unwrap();
    assert_eq!(tickers.get(0), Some("AAPL"));
    let dates = returns.column("trade_date").unwrap().date().unwrap();
    assert_eq!(dates.get(0), Some(days(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())));
    let value = returns.column("daily_return").unwrap().f64().unwrap().get(0).unwrap();
    assert!((value - 0.10).abs() < 1e-12, "daily_return = {value}");

    let close = view(&config, ViewKind::DailyClose);
    assert_eq!(close.height(), 2);
    let tickers = close.column("ticker").unwrap().str().unwrap();
    assert!(tickers.into_iter().all(|t| t == Some("AAPL")));
}

#[test]
fn absent_volume_is_excluded_not_zero() {
    let (_dir, config) = setup(
        "Trade Date,Ticker,Sector,Close Price,Volume\n\
         2024-01-02,AAPL,Tech,150,100\n\
         2024-01-02,MSFT,Tech,300,N/A\n\
         2024-01-02,XOM,Energy,90,50\n\
         2024-01-03,AAPL,Tech,151,300\n",
    );
    run_both(&config);

    let volume = view(&config, ViewKind::SectorVolume);
    assert_eq!(column_names(&volume), vec!["sector", "avg_volume"]);
    assert_eq!(volume.height(), 2);

    let sectors = volume.column("sector").unwrap().str().unwrap();
    let averages = volume.column("avg_volume").unwrap().f64().unwrap();
    assert_eq!(sectors.get(0), Some("ENERGY"));
    assert_eq!(averages.get(0), Some(50.0));
    assert_eq!(sectors.get(1), Some("TECH"));
    assert_eq!(averages.get(1), Some(200.0));
}

#[test]
fn daily_close_has_one_row_per_date_ticker() {
    let (_dir, config) = setup(
        "Trade Date,Ticker,Close Price,Source\n\
         2024-01-02,AAPL,150,feed-a\n\
         2024-01-02,AAPL,152,feed-b\n\
         2024-01-02,MSFT,N/A,feed-a\n\
         2024-01-03,AAPL,160,feed-a\n",
    );
    run_both(&config);

    let close = view(&config, ViewKind::DailyClose);
    assert_eq!(column_names(&close), vec!["trade_date", "ticker", "close_price"]);
    // (2024-01-02, MSFT) has no close at all, so 2 of 3 distinct pairs remain
    assert_eq!(close.height(), 2);
    let prices = close.column("close_price").unwrap().f64().unwrap();
    assert_eq!(prices.get(0), Some(151.0));
    assert_eq!(prices.get(1), Some(160.0));
}

#[test]
fn missing_canonical_is_fatal_and_writes_nothing() {
    let (_dir, config) = setup("Trade Date,Ticker\n");

    let err = run_aggregator(&config).unwrap_err();

    assert!(matches!(err, DataError::MissingSource { stage: Stage::Aggregator, .. }));
    for kind in ViewKind::ALL {
        assert!(!config.paths.view_path(kind).exists());
    }
}

#[test]
fn empty_canonical_gives_empty_views() {
    let (_dir, config) = setup("Trade Date,Ticker,Sector,Close Price,Volume\nbad,AAPL,Tech,1,1\n");
    run_both(&config);

    for kind in ViewKind::ALL {
        let df = view(&config, kind);
        assert_eq!(df.height(), 0, "{kind}");
        assert_eq!(column_names(&df), kind.columns());
    }
}

#[test]
fn one_failing_view_does_not_block_the_others() {
    let (_dir, config) = setup(
        "Trade Date,Ticker,Close Price\n\
         2024-01-02,AAPL,100\n\
         2024-01-03,AAPL,110\n",
    );
    run_cleaner(&config).unwrap();

    let summary = run_aggregator(&config).unwrap();

    assert!(!summary.all_succeeded());
    let failed: Vec<ViewKind> = summary.failures().map(|o| o.kind).collect();
    assert_eq!(failed, vec![ViewKind::SectorVolume]);
    assert!(config.paths.view_path(ViewKind::DailyClose).exists());
    assert!(config.paths.view_path(ViewKind::DailyReturns).exists());
    assert!(!config.paths.view_path(ViewKind::SectorVolume).exists());
}

#[test]
fn rerun_overwrites_previous_views() {
    let (_dir, config) = setup(
        "Trade Date,Ticker,Sector,Close Price,Volume\n\
         2024-01-02,AAPL,Tech,100,1\n\
         2024-01-03,AAPL,Tech,110,1\n",
    );
    run_both(&config);
    assert_eq!(view(&config, ViewKind::DailyReturns).height(), 1);

    std::fs::write(
        &config.paths.raw,
        "Trade Date,Ticker,Sector,Close Price,Volume\n2024-01-02,AAPL,Tech,100,1\n",
    )
    .unwrap();
    run_both(&config);

    assert_eq!(view(&config, ViewKind::DailyReturns).height(), 0);
}

#[test]
fn canonical_with_wrong_dtype_is_rejected() {
    let (_dir, config) = setup("unused\n");
    let mut df = DataFrame::new(vec![
        Column::new("trade_date".into(), &["2024-01-02"]),
        Column::new("ticker".into(), &["AAPL"]),
    ])
    .unwrap();
    write_artifact(&config.paths.canonical, &mut df, None).unwrap();

    let err = run_aggregator(&config).unwrap_err();
    assert!(matches!(err, DataError::Schema(_)));
}
