//! Dual Momentum evaluation

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ScreenError, ScreenResult};
use crate::strategies::{round1, Score, Strategy, StrategyContext, Verdict};
use crate::{PriceSeries, Signal, Status, Symbol};

use super::config::DualMomentumConfig;

const NAME: &str = "Dual Momentum (Antonacci)";
const TOTAL_CONDITIONS: usize = 2;

pub struct DualMomentumStrategy {
    config: DualMomentumConfig,
}

impl DualMomentumStrategy {
    pub fn new(config: DualMomentumConfig) -> Self {
        Self { config }
    }

    /// Return over the lookback window, measured from `len - lookback`
    fn window_return(&self, closes: &[f64]) -> Option<f64> {
        let lookback = self.config.lookback_days;
        if lookback == 0 || closes.len() < lookback {
            return None;
        }
        let current = *closes.last()?;
        let past = closes[closes.len() - lookback];
        if past == 0.0 {
            return None;
        }
        Some((current - past) / past)
    }

    /// Check the preconditions in order, returning the first violation
    fn check_preconditions<'a>(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        benchmark: Option<&'a PriceSeries>,
    ) -> ScreenResult<&'a PriceSeries> {
        let lookback = self.config.lookback_days;
        if series.len() < lookback {
            return Err(ScreenError::InsufficientData {
                ticker: symbol.to_string(),
                bars: series.len(),
                required: lookback,
            });
        }
        let benchmark = match benchmark {
            Some(b) if b.len() >= lookback => b,
            _ => {
                return Err(ScreenError::DataUnavailable {
                    ticker: "benchmark".to_string(),
                })
            }
        };
        let (common, _) = series.aligned_closes(benchmark);
        if common.len() < lookback {
            return Err(ScreenError::Misaligned {
                ticker: symbol.to_string(),
                common: common.len(),
                required: lookback,
            });
        }
        Ok(benchmark)
    }
}

/// Verdict wording for a failed precondition
fn precondition_reason(error: ScreenError) -> String {
    match error {
        ScreenError::InsufficientData { bars, required, .. } => {
            format!("Insufficient Data ({bars} < {required})")
        }
        ScreenError::DataUnavailable { .. } => "Benchmark Data Unavailable".to_string(),
        ScreenError::Misaligned { .. } => "Data Misalignment with Benchmark".to_string(),
        other => other.to_string(),
    }
}

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

impl Strategy for DualMomentumStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_bars(&self) -> usize {
        self.config.lookback_days
    }

    fn evaluate(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        ctx: &StrategyContext,
    ) -> ScreenResult<Verdict> {
        let benchmark = match self.check_preconditions(symbol, series, ctx.benchmark.as_deref()) {
            Ok(b) => b,
            Err(e) => {
                debug!(%symbol, "Dual momentum precondition failed: {}", e);
                return Ok(Verdict::fail(NAME, precondition_reason(e), TOTAL_CONDITIONS));
            }
        };

        let (stock_closes, bench_closes) = series.aligned_closes(benchmark);
        let stock_return = self
            .window_return(&stock_closes)
            .ok_or_else(|| ScreenError::fault(NAME, format!("{symbol}: zero reference price")))?;
        let bench_return = self
            .window_return(&bench_closes)
            .ok_or_else(|| ScreenError::fault(NAME, "benchmark: zero reference price"))?;

        let absolute = stock_return > self.config.risk_free_return;
        let relative = stock_return > bench_return;

        let mut details = Vec::with_capacity(TOTAL_CONDITIONS);
        let mut pass_reasons = Vec::new();
        let mut fail_reasons = Vec::new();

        if absolute {
            let line = format!("Absolute Momentum Positive (+{})", pct(stock_return));
            details.push(line.clone());
            pass_reasons.push(line);
        } else {
            let line = format!("Absolute Momentum Negative ({})", pct(stock_return));
            details.push(line.clone());
            fail_reasons.push(line);
        }

        if relative {
            let line = format!(
                "Outperforming Benchmark ({} vs {})",
                pct(stock_return),
                pct(bench_return)
            );
            details.push(line.clone());
            pass_reasons.push(line);
        } else {
            let line = format!(
                "Underperforming Benchmark ({} vs {})",
                pct(stock_return),
                pct(bench_return)
            );
            details.push(line.clone());
            fail_reasons.push(line);
        }

        let status = if absolute && relative {
            Status::Pass
        } else {
            Status::Fail
        };
        let signal = if status == Status::Pass {
            Signal::Buy
        } else if !absolute {
            Signal::Sell
        } else {
            Signal::Neutral
        };

        let mut metrics = BTreeMap::new();
        metrics.insert("stock_return_pct".to_string(), round1(stock_return * 100.0));
        metrics.insert("benchmark_return_pct".to_string(), round1(bench_return * 100.0));
        metrics.insert(
            "alpha_pct".to_string(),
            round1((stock_return - bench_return) * 100.0),
        );

        debug!(%symbol, %status, stock_return, bench_return, "Dual momentum evaluated");

        Ok(Verdict {
            strategy: NAME.to_string(),
            status,
            signal,
            score: Score::new(absolute as usize + relative as usize, TOTAL_CONDITIONS),
            details,
            pass_reasons,
            fail_reasons,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    const BARS: usize = 300;

    fn series_from(closes: impl IntoIterator<Item = f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let bars = closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| PriceBar::from_close(start + Duration::days(i as i64), c))
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    /// Linear path reaching `factor` times its value over the last 252 bars
    fn growth(factor: f64) -> PriceSeries {
        let anchor = BARS - 252;
        let step = 100.0 * (factor - 1.0) / 251.0;
        series_from((0..BARS).map(|i| 100.0 + step * (i as f64 - anchor as f64)))
    }

    fn ctx(benchmark: PriceSeries) -> StrategyContext {
        StrategyContext::default().with_benchmark(Some(benchmark))
    }

    #[test]
    fn test_doubling_against_flat_benchmark_passes() {
        let strategy = DualMomentumStrategy::new(DualMomentumConfig::default());
        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &growth(2.0), &ctx(series_from([100.0; BARS])))
            .unwrap();

        assert_eq!(verdict.status, Status::Pass);
        assert_eq!(verdict.signal, Signal::Buy);
        assert_eq!(verdict.score.to_string(), "2/2");
        assert!(verdict.details[0].contains("Absolute Momentum Positive"));
        assert!(verdict.details[1].contains("Outperforming Benchmark"));
        assert_relative_eq!(verdict.metric("stock_return_pct").unwrap(), 100.0);
        assert_relative_eq!(verdict.metric("alpha_pct").unwrap(), 100.0);
    }

    #[test]
    fn test_underperforming_benchmark_fails_relative() {
        let strategy = DualMomentumStrategy::new(DualMomentumConfig::default());
        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &growth(2.0), &ctx(growth(3.0)))
            .unwrap();

        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.signal, Signal::Neutral);
        assert_eq!(verdict.score.to_string(), "1/2");
        assert!(verdict.details[0].contains("Absolute Momentum Positive"));
        assert!(verdict.details[1].contains("Underperforming Benchmark"));
    }

    #[test]
    fn test_negative_return_signals_sell() {
        let strategy = DualMomentumStrategy::new(DualMomentumConfig::default());
        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &growth(0.5), &ctx(growth(0.25)))
            .unwrap();

        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.signal, Signal::Sell);
        assert_eq!(verdict.score.to_string(), "1/2");
        assert!(verdict.details[0].starts_with("Absolute Momentum Negative (-50.0%)"));
    }

    #[test]
    fn test_preconditions_short_circuit_in_order() {
        let strategy = DualMomentumStrategy::new(DualMomentumConfig::default());
        let short = series_from((0..100).map(|i| 100.0 + i as f64));

        let verdict = strategy
            .evaluate(&Symbol::new("NEW"), &short, &StrategyContext::default())
            .unwrap();
        assert_eq!(verdict.details, vec!["Insufficient Data (100 < 252)".to_string()]);
        assert_eq!(verdict.score.to_string(), "0/2");

        let verdict = strategy
            .evaluate(&Symbol::new("OLD"), &growth(2.0), &StrategyContext::default())
            .unwrap();
        assert_eq!(verdict.details, vec!["Benchmark Data Unavailable".to_string()]);
    }

    #[test]
    fn test_disjoint_dates_are_misaligned() {
        let strategy = DualMomentumStrategy::new(DualMomentumConfig::default());
        let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let old_bench = PriceSeries::new(
            (0..BARS)
                .map(|i| PriceBar::from_close(start + Duration::days(i as i64), 100.0))
                .collect(),
        )
        .unwrap();

        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &growth(2.0), &ctx(old_bench))
            .unwrap();
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.details, vec!["Data Misalignment with Benchmark".to_string()]);
    }
}
