//! Batch screener
//!
//! Fetches a universe, ranks it by relative strength and runs the Trend
//! Template with the RS-rating criterion against the ranked batch.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::PriceSource;
use crate::orchestrator::run_isolated;
use crate::ranker::{RankedUniverse, RankerConfig};
use crate::strategies::trend_template::TrendTemplateStrategy;
use crate::strategies::{Score, Strategy, StrategyContext};
use crate::{Config, PriceSeries, Status, Symbol};

/// One screened ticker
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub ticker: Symbol,
    pub price: f64,
    pub rs_rating: Option<f64>,
    pub status: Status,
    pub score: Score,
    pub pivot: Option<f64>,
    pub stop_loss: Option<f64>,
    pub vcp: bool,
    pub details: Vec<String>,
}

/// Screen output: candidates in input order, tickers without data apart
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScreenReport {
    pub candidates: Vec<Candidate>,
    pub missing: Vec<Symbol>,
}

impl ScreenReport {
    pub fn passing(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.status == Status::Pass)
    }

    /// Candidates ordered by RS rating, strongest first
    pub fn by_rs_rating(&self) -> Vec<&Candidate> {
        let mut sorted: Vec<&Candidate> = self.candidates.iter().collect();
        sorted.sort_by(|a, b| {
            let a = a.rs_rating.unwrap_or(f64::MIN);
            let b = b.rs_rating.unwrap_or(f64::MIN);
            b.total_cmp(&a)
        });
        sorted
    }
}

pub struct Screener {
    source: Arc<dyn PriceSource>,
    strategy: TrendTemplateStrategy,
    ranker: RankerConfig,
    workers: usize,
}

impl Screener {
    pub fn new(config: &Config, source: Arc<dyn PriceSource>) -> Self {
        Self {
            source,
            strategy: TrendTemplateStrategy::new(config.trend_template.ranked()),
            ranker: config.ranker.clone(),
            workers: config.screener.workers.max(1),
        }
    }

    pub fn screen(&self, symbols: &[Symbol]) -> ScreenReport {
        self.run(symbols, None)
    }

    pub fn screen_with_progress(&self, symbols: &[Symbol], progress_bar: ProgressBar) -> ScreenReport {
        self.run(symbols, Some(&progress_bar))
    }

    fn run(&self, symbols: &[Symbol], progress_bar: Option<&ProgressBar>) -> ScreenReport {
        info!("Screening {} tickers with {} workers", symbols.len(), self.workers);
        let min_bars = self.strategy.min_bars();

        let fetch = |symbol: &Symbol| -> Option<PriceSeries> {
            let series = match self.source.price_history(symbol, min_bars) {
                Ok(series) => series.filter(|s| !s.is_empty()),
                Err(e) => {
                    warn!(%symbol, "Price fetch failed: {:#}", e);
                    None
                }
            };
            if let Some(pb) = progress_bar {
                pb.inc(1);
            }
            series
        };

        let fetched: Vec<Option<PriceSeries>> =
            match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
                Ok(pool) => pool.install(|| symbols.par_iter().map(fetch).collect()),
                Err(e) => {
                    warn!("Failed to build worker pool, fetching sequentially: {}", e);
                    symbols.iter().map(fetch).collect()
                }
            };

        let rankings = RankedUniverse::rank_with(
            &self.ranker,
            symbols
                .iter()
                .zip(&fetched)
                .filter_map(|(symbol, series)| series.as_ref().map(|s| (symbol, s))),
        );
        let ctx = StrategyContext::default().with_rankings(rankings);

        let mut report = ScreenReport::default();
        for (symbol, series) in symbols.iter().zip(&fetched) {
            let Some(series) = series else {
                report.missing.push(symbol.clone());
                continue;
            };
            let verdict = run_isolated(&self.strategy, symbol, series, &ctx);
            report.candidates.push(Candidate {
                ticker: symbol.clone(),
                price: series.last().map(|b| b.close).unwrap_or_default(),
                rs_rating: ctx.rankings.as_ref().and_then(|r| r.rating(symbol)),
                status: verdict.status,
                score: verdict.score,
                pivot: verdict.metric("pivot"),
                stop_loss: verdict.metric("stop_loss"),
                vcp: verdict.metric("vcp") == Some(1.0),
                details: verdict.details,
            });
        }

        info!(
            screened = report.candidates.len(),
            passed = report.passing().count(),
            missing = report.missing.len(),
            "Screen complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;

    struct MapSource(HashMap<Symbol, PriceSeries>);

    impl PriceSource for MapSource {
        fn price_history(&self, symbol: &Symbol, _min_bars: usize) -> anyhow::Result<Option<PriceSeries>> {
            Ok(self.0.get(symbol).cloned())
        }
    }

    fn linear(start_price: f64, step: f64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        PriceSeries::new(
            (0..300)
                .map(|i| PriceBar::from_close(start + Duration::days(i), start_price + step * i as f64))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_screen_ranks_and_keeps_input_order() {
        let mut data = HashMap::new();
        data.insert(Symbol::new("SLOW"), linear(100.0, 0.05));
        data.insert(Symbol::new("FAST"), linear(10.0, 1.0));
        data.insert(Symbol::new("DOWN"), linear(400.0, -1.0));
        let screener = Screener::new(&Config::default(), Arc::new(MapSource(data)));

        let symbols: Vec<Symbol> = ["SLOW", "GONE", "FAST", "DOWN"].iter().map(Symbol::new).collect();
        let report = screener.screen(&symbols);

        let order: Vec<&str> = report.candidates.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(order, vec!["SLOW", "FAST", "DOWN"]);
        assert_eq!(report.missing, vec![Symbol::new("GONE")]);

        let fast = &report.candidates[1];
        assert_eq!(fast.rs_rating, Some(99.0));
        assert_eq!(fast.status, Status::Pass);
        assert_eq!(fast.score.to_string(), "8/8");
        assert_eq!(fast.pivot, Some(309.0));

        let down = &report.candidates[2];
        assert_eq!(down.status, Status::Fail);
        assert_eq!(report.by_rs_rating()[0].ticker.as_str(), "FAST");
    }
}
