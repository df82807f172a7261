//! Strategy orchestration
//!
//! Runs every registered strategy against one ticker and folds the verdicts
//! into an [`AnalysisReport`]. Batches run on a bounded rayon pool and come
//! back in input order.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::SqliteCache;
use crate::chart::ChartSink;
use crate::data::PriceSource;
use crate::error::ScreenError;
use crate::strategies::{create_strategies, round2, Strategy, StrategyContext, Verdict};
use crate::{Config, PriceSeries, Status, Symbol};

pub const DATA_NOT_FOUND: &str = "Data Not Found";

/// Aggregate counts over one ticker's verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub count_passed: usize,
    pub count_total: usize,
    pub overall_bullish: bool,
    pub overall_bearish: bool,
}

impl ReportSummary {
    fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let count_total = verdicts.len();
        let count_passed = verdicts.iter().filter(|v| v.is_pass()).count();
        Self {
            count_passed,
            count_total,
            overall_bullish: count_total > 0 && count_passed == count_total,
            overall_bearish: count_total > 0 && count_passed == 0,
        }
    }
}

/// Bullish / bearish / neutral counts over a set of summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketBreadth {
    pub total: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl MarketBreadth {
    pub fn tally<'a>(summaries: impl IntoIterator<Item = &'a ReportSummary>) -> Self {
        let mut breadth = Self::default();
        for summary in summaries {
            breadth.total += 1;
            if summary.overall_bullish {
                breadth.bullish += 1;
            } else if summary.overall_bearish {
                breadth.bearish += 1;
            } else {
                breadth.neutral += 1;
            }
        }
        breadth
    }
}

/// Everything known about one ticker after a run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub ticker: Symbol,
    /// Last close, rounded to 2 decimals
    pub price: Option<f64>,
    /// Verdicts in registration order, serialized as a name-keyed map
    #[serde(serialize_with = "verdict_map")]
    pub strategies: Vec<Verdict>,
    pub summary: ReportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn verdict_map<S: Serializer>(verdicts: &[Verdict], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(verdicts.iter().map(|v| (v.strategy.as_str(), v)))
}

impl AnalysisReport {
    fn not_found(ticker: Symbol, strategy_count: usize) -> Self {
        Self {
            ticker,
            price: None,
            strategies: Vec::new(),
            summary: ReportSummary {
                count_passed: 0,
                count_total: strategy_count,
                overall_bullish: false,
                overall_bearish: false,
            },
            error: Some(DATA_NOT_FOUND.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.error.is_some()
    }

    pub fn verdict(&self, strategy: &str) -> Option<&Verdict> {
        self.strategies.iter().find(|v| v.strategy == strategy)
    }
}

/// Owns the ordered strategy list and the price source
pub struct StrategyManager {
    strategies: Vec<Box<dyn Strategy>>,
    source: Arc<dyn PriceSource>,
    benchmark: Option<Symbol>,
    chart_sink: Option<Arc<dyn ChartSink>>,
    analysis_store: Option<SqliteCache>,
    workers: usize,
}

impl StrategyManager {
    /// Default registry: Trend Template then Dual Momentum
    pub fn new(config: &Config, source: Arc<dyn PriceSource>) -> Self {
        Self::with_strategies(create_strategies(config), source)
            .with_benchmark(Some(config.benchmark()))
            .with_workers(config.screener.workers)
    }

    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>, source: Arc<dyn PriceSource>) -> Self {
        Self {
            strategies,
            source,
            benchmark: None,
            chart_sink: None,
            analysis_store: None,
            workers: 5,
        }
    }

    pub fn with_benchmark(mut self, benchmark: Option<Symbol>) -> Self {
        self.benchmark = benchmark;
        self
    }

    pub fn with_chart_sink(mut self, sink: Arc<dyn ChartSink>) -> Self {
        self.chart_sink = Some(sink);
        self
    }

    /// Record every completed analysis in `cache`
    pub fn with_analysis_store(mut self, cache: SqliteCache) -> Self {
        self.analysis_store = Some(cache);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Longest history any registered strategy needs
    pub fn min_bars(&self) -> usize {
        self.strategies.iter().map(|s| s.min_bars()).max().unwrap_or(0)
    }

    pub fn source(&self) -> &Arc<dyn PriceSource> {
        &self.source
    }

    /// Fetch the benchmark once for a run
    ///
    /// A missing benchmark is not fatal: strategies that need it report it.
    pub fn load_context(&self) -> StrategyContext {
        let Some(symbol) = &self.benchmark else {
            return StrategyContext::default();
        };
        let benchmark = match self.source.price_history(symbol, self.min_bars()) {
            Ok(Some(series)) if !series.is_empty() => {
                debug!(%symbol, bars = series.len(), "Benchmark loaded");
                Some(series)
            }
            Ok(_) => {
                warn!(%symbol, "Benchmark data not found");
                None
            }
            Err(e) => {
                warn!(%symbol, "Benchmark fetch failed: {:#}", e);
                None
            }
        };
        StrategyContext::default().with_benchmark(benchmark)
    }

    pub fn analyze(&self, symbol: &Symbol) -> AnalysisReport {
        let ctx = self.load_context();
        self.analyze_with(symbol, &ctx)
    }

    /// Analyze one ticker against a prepared context
    pub fn analyze_with(&self, symbol: &Symbol, ctx: &StrategyContext) -> AnalysisReport {
        let series = match self.source.price_history(symbol, self.min_bars()) {
            Ok(Some(series)) if !series.is_empty() => series,
            Ok(_) => {
                let missing = ScreenError::DataUnavailable {
                    ticker: symbol.to_string(),
                };
                debug!(%symbol, "{}", missing);
                return AnalysisReport::not_found(symbol.clone(), self.strategies.len());
            }
            Err(e) => {
                warn!(%symbol, "Price fetch failed: {:#}", e);
                return AnalysisReport::not_found(symbol.clone(), self.strategies.len());
            }
        };
        let report = self.evaluate_series(symbol, &series, ctx);
        if let Some(store) = &self.analysis_store {
            if let Err(e) = store.store_analysis(&report) {
                warn!(%symbol, "Failed to record analysis: {:#}", e);
            }
        }
        report
    }

    /// Run every strategy over an already loaded series
    pub fn evaluate_series(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        ctx: &StrategyContext,
    ) -> AnalysisReport {
        let verdicts: Vec<Verdict> = self
            .strategies
            .iter()
            .map(|strategy| run_isolated(strategy.as_ref(), symbol, series, ctx))
            .collect();

        if let Some(sink) = &self.chart_sink {
            self.publish_chart(sink.as_ref(), symbol, series, &verdicts);
        }

        let summary = ReportSummary::from_verdicts(&verdicts);
        debug!(
            %symbol,
            passed = summary.count_passed,
            total = summary.count_total,
            "Analysis complete"
        );

        AnalysisReport {
            ticker: symbol.clone(),
            price: series.last().map(|b| round2(b.close)),
            strategies: verdicts,
            summary,
            error: None,
        }
    }

    fn publish_chart(
        &self,
        sink: &dyn ChartSink,
        symbol: &Symbol,
        series: &PriceSeries,
        verdicts: &[Verdict],
    ) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.strategies.iter().find_map(|s| s.indicator_frame(series)) {
                Some(frame) => sink.publish(symbol, &frame, verdicts),
                None => Ok(()),
            }
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%symbol, "Chart export failed: {:#}", e),
            Err(payload) => {
                warn!(%symbol, "Chart export panicked: {}", panic_message(payload.as_ref()));
            }
        }
    }

    /// Analyze many tickers concurrently, one report per input in input order
    pub fn analyze_batch(&self, symbols: &[Symbol]) -> Vec<AnalysisReport> {
        self.run_batch(symbols, None)
    }

    pub fn analyze_batch_with_progress(
        &self,
        symbols: &[Symbol],
        progress_bar: ProgressBar,
    ) -> Vec<AnalysisReport> {
        self.run_batch(symbols, Some(&progress_bar))
    }

    fn run_batch(&self, symbols: &[Symbol], progress_bar: Option<&ProgressBar>) -> Vec<AnalysisReport> {
        info!("Analyzing {} tickers with {} workers", symbols.len(), self.workers);
        let ctx = self.load_context();

        let work = |symbol: &Symbol| {
            let report = self.analyze_with(symbol, &ctx);
            if let Some(pb) = progress_bar {
                pb.inc(1);
            }
            report
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(|| symbols.par_iter().map(work).collect()),
            Err(e) => {
                warn!("Failed to build worker pool, running sequentially: {}", e);
                symbols.iter().map(work).collect()
            }
        }
    }
}

/// Evaluate one strategy, converting errors and panics into ERROR verdicts
pub(crate) fn run_isolated(
    strategy: &dyn Strategy,
    symbol: &Symbol,
    series: &PriceSeries,
    ctx: &StrategyContext,
) -> Verdict {
    let name = strategy.name();
    match catch_unwind(AssertUnwindSafe(|| strategy.evaluate(symbol, series, ctx))) {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            warn!(%symbol, strategy = name, "Strategy error: {}", e);
            Verdict::error(name, e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%symbol, strategy = name, "Strategy panicked: {}", message);
            Verdict::error(name, message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// (pass, fail, error) verdict counts across a batch
pub fn status_counts(reports: &[AnalysisReport]) -> (usize, usize, usize) {
    reports
        .iter()
        .flat_map(|r| r.strategies.iter())
        .fold((0, 0, 0), |(pass, fail, error), v| match v.status {
            Status::Pass => (pass + 1, fail, error),
            Status::Fail => (pass, fail + 1, error),
            Status::Error => (pass, fail, error + 1),
        })
}
