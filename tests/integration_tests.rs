//! Integration tests for the trend screener
//!
//! These tests drive the public API end to end: CSV files on disk, the price
//! cache, the orchestrator, the screener and the chart sink.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use std::path::Path;
use std::sync::Arc;

use trend_screener::cache::{CachedSource, SqliteCache};
use trend_screener::chart::{ChartSink, JsonChartSink};
use trend_screener::data::{save_csv, CsvDirectorySource, PriceSource};
use trend_screener::indicators::{self, IndicatorFrame};
use trend_screener::orchestrator::{MarketBreadth, DATA_NOT_FOUND};
use trend_screener::screener::Screener;
use trend_screener::strategies::Strategy;
use trend_screener::{
    Config, PriceBar, PriceSeries, ScreenResult, Signal, Status, StrategyContext, StrategyManager,
    Symbol, Verdict,
};

// =============================================================================
// Test Utilities
// =============================================================================

const BARS: usize = 300;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// Generate a series from a close-price function, one bar per calendar day
fn generate_series(count: usize, close: impl Fn(usize) -> f64) -> PriceSeries {
    let bars = (0..count)
        .map(|i| {
            let c = close(i);
            PriceBar::new(start_date() + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 10_000.0)
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

fn uptrend() -> PriceSeries {
    generate_series(BARS, |i| 10.0 + i as f64)
}

fn downtrend() -> PriceSeries {
    generate_series(BARS, |i| 400.0 - i as f64)
}

fn flat(price: f64) -> PriceSeries {
    generate_series(BARS, |_| price)
}

fn write_csv(dir: &Path, ticker: &str, series: &PriceSeries) {
    save_csv(series, dir.join(format!("{ticker}.csv"))).unwrap();
}

/// Data directory with two stocks and a flat benchmark
fn sample_data_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "UP.NS", &uptrend());
    write_csv(dir.path(), "DOWN.NS", &downtrend());
    write_csv(dir.path(), "^NSEI", &flat(100.0));
    dir
}

fn manager_for(dir: &Path) -> StrategyManager {
    let source: Arc<dyn PriceSource> = Arc::new(CsvDirectorySource::new(dir));
    StrategyManager::new(&Config::default(), source)
}

struct PanickingStrategy;

impl Strategy for PanickingStrategy {
    fn name(&self) -> &'static str {
        "Panicking"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate(&self, _: &Symbol, _: &PriceSeries, _: &StrategyContext) -> ScreenResult<Verdict> {
        panic!("index out of range in custom rule")
    }
}

struct FailingSink;

impl ChartSink for FailingSink {
    fn publish(&self, _: &Symbol, _: &IndicatorFrame, _: &[Verdict]) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

struct CrashingSink;

impl ChartSink for CrashingSink {
    fn publish(&self, _: &Symbol, _: &IndicatorFrame, _: &[Verdict]) -> anyhow::Result<()> {
        panic!("renderer crashed")
    }
}

/// Reports reduced to what a chart sink must never change
fn outcomes(manager: &StrategyManager, symbols: &[Symbol]) -> Vec<(String, Option<String>, String)> {
    manager
        .analyze_batch(symbols)
        .iter()
        .map(|r| {
            let verdicts = r
                .strategies
                .iter()
                .map(|v| format!("{}:{}:{}", v.strategy, v.status, v.score))
                .collect::<Vec<_>>()
                .join(",");
            (r.ticker.to_string(), r.error.clone(), verdicts)
        })
        .collect()
}

// =============================================================================
// Orchestrator
// =============================================================================

#[test]
fn test_analyze_uptrend_against_flat_benchmark() {
    let dir = sample_data_dir();
    let report = manager_for(dir.path()).analyze(&Symbol::new("UP.NS"));

    assert!(report.error.is_none());
    assert_eq!(report.price, Some(309.0));

    let names: Vec<&str> = report.strategies.iter().map(|v| v.strategy.as_str()).collect();
    assert_eq!(names, vec!["Minervini Trend Template", "Dual Momentum (Antonacci)"]);

    let trend = report.verdict("Minervini Trend Template").unwrap();
    assert_eq!(trend.status, Status::Pass);
    assert_eq!(trend.signal, Signal::Buy);
    assert_eq!(trend.score.to_string(), "8/8");

    let momentum = report.verdict("Dual Momentum (Antonacci)").unwrap();
    assert_eq!(momentum.status, Status::Pass);
    assert_eq!(momentum.score.to_string(), "2/2");
    assert_relative_eq!(momentum.metric("benchmark_return_pct").unwrap(), 0.0);

    assert_eq!(report.summary.count_passed, 2);
    assert!(report.summary.overall_bullish);
}

#[test]
fn test_analyze_downtrend_is_bearish() {
    let dir = sample_data_dir();
    let report = manager_for(dir.path()).analyze(&Symbol::new("DOWN.NS"));

    let trend = report.verdict("Minervini Trend Template").unwrap();
    assert_eq!(trend.status, Status::Fail);
    assert_eq!(trend.signal, Signal::Neutral);
    assert!(trend.score.passed < 8);

    let momentum = report.verdict("Dual Momentum (Antonacci)").unwrap();
    assert_eq!(momentum.signal, Signal::Sell);
    assert!(report.summary.overall_bearish);
}

#[test]
fn test_batch_preserves_order_and_marks_missing() {
    let dir = sample_data_dir();
    let manager = manager_for(dir.path()).with_workers(3);
    let symbols: Vec<Symbol> = ["DOWN.NS", "GHOST.NS", "UP.NS", "DOWN.NS"]
        .iter()
        .map(|s| Symbol::new(s))
        .collect();

    let reports = manager.analyze_batch(&symbols);

    assert_eq!(reports.len(), symbols.len());
    for (report, symbol) in reports.iter().zip(&symbols) {
        assert_eq!(&report.ticker, symbol);
    }
    let missing: Vec<_> = reports.iter().filter(|r| r.is_missing()).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].ticker.as_str(), "GHOST.NS");
    assert_eq!(missing[0].error.as_deref(), Some(DATA_NOT_FOUND));
    assert!(missing[0].strategies.is_empty());
}

#[test]
fn test_panicking_strategy_is_isolated() {
    let dir = sample_data_dir();
    let source: Arc<dyn PriceSource> = Arc::new(CsvDirectorySource::new(dir.path()));
    let config = Config::default();
    let mut strategies = trend_screener::strategies::create_strategies(&config);
    strategies.insert(1, Box::new(PanickingStrategy));
    let manager = StrategyManager::with_strategies(strategies, source)
        .with_benchmark(Some(config.benchmark()));

    let report = manager.analyze(&Symbol::new("UP.NS"));

    let broken = report.verdict("Panicking").unwrap();
    assert_eq!(broken.status, Status::Error);
    assert_eq!(broken.details, vec!["index out of range in custom rule".to_string()]);

    assert_eq!(report.verdict("Minervini Trend Template").unwrap().status, Status::Pass);
    assert_eq!(report.verdict("Dual Momentum (Antonacci)").unwrap().status, Status::Pass);
    assert_eq!(report.summary.count_passed, 2);
    assert_eq!(report.summary.count_total, 3);
    assert!(!report.summary.overall_bullish);
}

#[test]
fn test_missing_benchmark_fails_dual_momentum_only() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "UP.NS", &uptrend());
    let report = manager_for(dir.path()).analyze(&Symbol::new("UP.NS"));

    assert_eq!(report.verdict("Minervini Trend Template").unwrap().status, Status::Pass);
    let momentum = report.verdict("Dual Momentum (Antonacci)").unwrap();
    assert_eq!(momentum.status, Status::Fail);
    assert_eq!(momentum.details, vec!["Benchmark Data Unavailable".to_string()]);
}

#[test]
fn test_chart_sink_receives_successful_analyses() {
    let dir = sample_data_dir();
    let charts = tempfile::tempdir().unwrap();
    let manager = manager_for(dir.path())
        .with_chart_sink(Arc::new(JsonChartSink::new(charts.path())));

    manager.analyze(&Symbol::new("UP.NS"));
    manager.analyze(&Symbol::new("GHOST.NS"));

    assert!(charts.path().join("UP.NS.json").exists());
    assert!(!charts.path().join("GHOST.NS.json").exists());
}

#[test]
fn test_failing_chart_sinks_leave_reports_unchanged() {
    let dir = sample_data_dir();
    let symbols = vec![Symbol::new("UP.NS"), Symbol::new("MISSING.NS"), Symbol::new("DOWN.NS")];
    let expected = outcomes(&manager_for(dir.path()), &symbols);

    let failing = manager_for(dir.path()).with_chart_sink(Arc::new(FailingSink));
    assert_eq!(outcomes(&failing, &symbols), expected);

    let crashing = manager_for(dir.path())
        .with_workers(2)
        .with_chart_sink(Arc::new(CrashingSink));
    assert_eq!(outcomes(&crashing, &symbols), expected);
}

#[test]
fn test_analyses_feed_holdings_breadth() {
    let dir = sample_data_dir();
    let cache_dir = tempfile::tempdir().unwrap();
    let store = SqliteCache::open(cache_dir.path().join("prices.db")).unwrap();
    let manager = manager_for(dir.path()).with_analysis_store(store.clone());

    let symbols = vec![Symbol::new("UP.NS"), Symbol::new("DOWN.NS"), Symbol::new("MISSING.NS")];
    manager.analyze_batch(&symbols);
    // A second run overwrites instead of adding rows
    manager.analyze(&Symbol::new("UP.NS"));

    let reopened = SqliteCache::open(cache_dir.path().join("prices.db")).unwrap();
    let up = reopened.load_analysis(&Symbol::new("UP.NS")).unwrap().unwrap();
    assert_eq!(up.price, Some(309.0));
    assert_eq!(up.summary.count_passed, 2);

    let breadth = reopened.breadth(&symbols).unwrap();
    assert_eq!(
        breadth,
        MarketBreadth {
            total: 2,
            bullish: 1,
            bearish: 1,
            neutral: 0,
        }
    );
}

// =============================================================================
// Data Layer
// =============================================================================

#[test]
fn test_cache_serves_history_after_upstream_disappears() {
    let dir = sample_data_dir();
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = SqliteCache::open(cache_dir.path().join("prices.db")).unwrap();
    let source = CachedSource::new(cache, Box::new(CsvDirectorySource::new(dir.path())));
    let symbol = Symbol::new("UP.NS");

    let first = source.price_history(&symbol, 260).unwrap().unwrap();
    assert_eq!(first.len(), BARS);

    std::fs::remove_file(dir.path().join("UP.NS.csv")).unwrap();
    let second = source.price_history(&symbol, 260).unwrap().unwrap();
    assert_eq!(second, first);
}

// =============================================================================
// Screener
// =============================================================================

#[test]
fn test_screener_ranks_universe() {
    let dir = sample_data_dir();
    write_csv(dir.path(), "SLOW.NS", &generate_series(BARS, |i| 100.0 + 0.1 * i as f64));
    let source: Arc<dyn PriceSource> = Arc::new(CsvDirectorySource::new(dir.path()));
    let screener = Screener::new(&Config::default(), source);

    let symbols: Vec<Symbol> = ["SLOW.NS", "UP.NS", "MISSING.NS", "DOWN.NS"]
        .iter()
        .map(|s| Symbol::new(s))
        .collect();
    let report = screener.screen(&symbols);

    assert_eq!(report.candidates.len(), 3);
    assert_eq!(report.missing, vec![Symbol::new("MISSING.NS")]);

    let up = report.candidates.iter().find(|c| c.ticker.as_str() == "UP.NS").unwrap();
    assert_relative_eq!(up.rs_rating.unwrap(), 99.0);
    assert_eq!(up.status, Status::Pass);
    assert_relative_eq!(up.stop_loss.unwrap(), 284.28);

    let passing: Vec<&str> = report.passing().map(|c| c.ticker.as_str()).collect();
    assert_eq!(passing, vec!["UP.NS"]);
}

// =============================================================================
// Indicators
// =============================================================================

#[test]
fn test_rsi_extremes_on_monotonic_series() {
    let rising: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
    let falling: Vec<f64> = rising.iter().rev().copied().collect();

    assert_relative_eq!(indicators::latest(&indicators::rsi(&rising, 14)).unwrap(), 100.0);
    assert_relative_eq!(indicators::latest(&indicators::rsi(&falling, 14)).unwrap(), 0.0);
}
