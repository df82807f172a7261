//! Trend Template evaluation
//!
//! Indicators are computed once per call into an [`IndicatorFrame`] and every
//! criterion reads the latest snapshot of it.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ScreenError, ScreenResult};
use crate::indicators::{latest, rolling_std, IndicatorFrame};
use crate::strategies::{round2, Score, Strategy, StrategyContext, Verdict};
use crate::{PriceSeries, Signal, Status, Symbol};

use super::config::{MomentumCriterion, TrendTemplateConfig};

const NAME: &str = "Minervini Trend Template";
const TOTAL_CRITERIA: usize = 8;
const TREND_LOOKBACK: usize = 20;

/// One evaluated criterion with the phrasing for whichever way it went
struct Criterion {
    passed: bool,
    reason: String,
}

impl Criterion {
    fn check(passed: bool, pass_reason: String, fail_reason: String) -> Self {
        let reason = if passed { pass_reason } else { fail_reason };
        Self { passed, reason }
    }
}

/// Values every criterion needs from the latest bar
struct Inputs {
    price: f64,
    sma_50: f64,
    sma_150: f64,
    sma_200: f64,
    sma_200_prior: f64,
    trending: bool,
    low_52w: f64,
    high_52w: f64,
    rsi: Option<f64>,
    momentum: f64,
}

pub struct TrendTemplateStrategy {
    config: TrendTemplateConfig,
}

impl TrendTemplateStrategy {
    pub fn new(config: TrendTemplateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendTemplateConfig {
        &self.config
    }

    fn gather_inputs(
        &self,
        symbol: &Symbol,
        frame: &IndicatorFrame,
        ctx: &StrategyContext,
    ) -> Option<Inputs> {
        let snap = frame.latest()?;
        let last = frame.len() - 1;
        let sma_200_prior = frame
            .sma_200
            .get(last.checked_sub(TREND_LOOKBACK)?)
            .copied()
            .flatten()?;

        let momentum = match self.config.momentum {
            MomentumCriterion::Rsi => snap.rsi_14?,
            MomentumCriterion::RsRating => ctx.rankings.as_ref()?.rating(symbol)?,
        };

        Some(Inputs {
            price: snap.close,
            sma_50: snap.sma_50?,
            sma_150: snap.sma_150?,
            sma_200: snap.sma_200?,
            sma_200_prior,
            trending: snap.sma_200_trending?,
            low_52w: snap.low_52w?,
            high_52w: snap.high_52w?,
            rsi: snap.rsi_14,
            momentum,
        })
    }

    fn criteria(&self, v: &Inputs) -> Vec<Criterion> {
        let low_threshold = self.config.low_multiple * v.low_52w;
        let high_threshold = self.config.high_multiple * v.high_52w;
        let pct_above_low = (v.price - v.low_52w) / v.low_52w * 100.0;
        let pct_below_high = (v.high_52w - v.price) / v.high_52w * 100.0;

        let momentum = match self.config.momentum {
            MomentumCriterion::Rsi => Criterion::check(
                v.momentum >= self.config.rsi_threshold,
                format!("RSI Bullish ({:.2})", v.momentum),
                format!(
                    "RSI Weak ({:.2} < {:.0})",
                    v.momentum, self.config.rsi_threshold
                ),
            ),
            MomentumCriterion::RsRating => Criterion::check(
                v.momentum >= self.config.rs_threshold,
                format!("RS Rating Strong ({:.0})", v.momentum),
                format!(
                    "RS Rating Weak ({:.0} < {:.0})",
                    v.momentum, self.config.rs_threshold
                ),
            ),
        };

        vec![
            Criterion::check(
                v.price > v.sma_150 && v.price > v.sma_200,
                format!(
                    "Price ({:.2}) > 150/200 SMA ({:.2} / {:.2})",
                    v.price, v.sma_150, v.sma_200
                ),
                format!(
                    "Price ({:.2}) below 150/200 SMA ({:.2} / {:.2})",
                    v.price, v.sma_150, v.sma_200
                ),
            ),
            Criterion::check(
                v.sma_150 > v.sma_200,
                format!("150 SMA ({:.2}) > 200 SMA ({:.2})", v.sma_150, v.sma_200),
                format!("150 SMA ({:.2}) <= 200 SMA ({:.2})", v.sma_150, v.sma_200),
            ),
            Criterion::check(
                v.trending,
                format!(
                    "200 SMA Trending Up ({:.2} vs {:.2} {} days ago)",
                    v.sma_200, v.sma_200_prior, TREND_LOOKBACK
                ),
                format!(
                    "200 SMA Flattening/Falling ({:.2} vs {:.2} {} days ago)",
                    v.sma_200, v.sma_200_prior, TREND_LOOKBACK
                ),
            ),
            Criterion::check(
                v.sma_50 > v.sma_150 && v.sma_50 > v.sma_200,
                format!(
                    "50 SMA ({:.2}) > 150 & 200 SMA ({:.2} / {:.2})",
                    v.sma_50, v.sma_150, v.sma_200
                ),
                format!(
                    "50 SMA ({:.2}) below 150/200 SMA ({:.2} / {:.2})",
                    v.sma_50, v.sma_150, v.sma_200
                ),
            ),
            Criterion::check(
                v.price > v.sma_50,
                format!("Price ({:.2}) > 50 SMA ({:.2})", v.price, v.sma_50),
                format!("Price ({:.2}) < 50 SMA ({:.2})", v.price, v.sma_50),
            ),
            Criterion::check(
                v.price >= low_threshold,
                format!("Above 52W Low ({:.2}, +{:.2}%)", v.low_52w, pct_above_low),
                format!(
                    "Too close to 52W Low ({:.2}, +{:.2}%)",
                    v.low_52w, pct_above_low
                ),
            ),
            Criterion::check(
                v.price >= high_threshold,
                format!("Near 52W High ({:.2}, -{:.2}%)", v.high_52w, pct_below_high),
                format!(
                    "Too far from 52W High ({:.2}, -{:.2}%)",
                    v.high_52w, pct_below_high
                ),
            ),
            momentum,
        ]
    }

    /// Pivot, stop and contraction diagnostics offered alongside the verdict
    fn setup_metrics(&self, series: &PriceSeries, price: f64, metrics: &mut BTreeMap<String, f64>) {
        let bars = series.bars();
        let window = self.config.pivot_bars.min(bars.len());
        let pivot = bars[bars.len() - window..]
            .iter()
            .map(|b| b.high)
            .fold(f64::MIN, f64::max);
        if window > 0 {
            metrics.insert("pivot".to_string(), round2(pivot));
        }
        metrics.insert(
            "stop_loss".to_string(),
            round2(price * (1.0 - self.config.stop_loss_pct)),
        );

        let closes = series.closes();
        let short = latest(&rolling_std(&closes, self.config.vcp_short));
        let long = latest(&rolling_std(&closes, self.config.vcp_long));
        if let (Some(short), Some(long)) = (short, long) {
            let contracting = short < long * self.config.vcp_ratio;
            metrics.insert("vcp".to_string(), if contracting { 1.0 } else { 0.0 });
        }
    }

    fn require_history(&self, symbol: &Symbol, series: &PriceSeries) -> ScreenResult<()> {
        if series.len() < self.config.min_bars {
            return Err(ScreenError::InsufficientData {
                ticker: symbol.to_string(),
                bars: series.len(),
                required: self.config.min_bars,
            });
        }
        Ok(())
    }
}

impl Strategy for TrendTemplateStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars
    }

    fn evaluate(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        ctx: &StrategyContext,
    ) -> ScreenResult<Verdict> {
        if let Err(e) = self.require_history(symbol, series) {
            debug!(%symbol, "Trend template skipped: {}", e);
            let reason = match e {
                ScreenError::InsufficientData { bars, required, .. } => {
                    format!("Insufficient Data ({bars} < {required} days)")
                }
                other => other.to_string(),
            };
            return Ok(Verdict::fail(NAME, reason, TOTAL_CRITERIA));
        }

        let frame = IndicatorFrame::compute(series);
        let inputs = match self.gather_inputs(symbol, &frame, ctx) {
            Some(inputs) => inputs,
            None => {
                let reason = match self.config.momentum {
                    MomentumCriterion::RsRating if ctx.rankings.is_none() => "RS Rating Unavailable",
                    _ => "Insufficient Data for Indicators",
                };
                debug!(%symbol, reason, "Trend template: indicators incomplete");
                return Ok(Verdict::fail(NAME, reason, TOTAL_CRITERIA));
            }
        };

        let criteria = self.criteria(&inputs);
        let passed = criteria.iter().filter(|c| c.passed).count();
        let (pass_reasons, fail_reasons): (Vec<_>, Vec<_>) =
            criteria.into_iter().partition(|c| c.passed);
        let pass_reasons: Vec<String> = pass_reasons.into_iter().map(|c| c.reason).collect();
        let fail_reasons: Vec<String> = fail_reasons.into_iter().map(|c| c.reason).collect();

        let status = if fail_reasons.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        };
        let signal = if status == Status::Pass {
            Signal::Buy
        } else {
            Signal::Neutral
        };

        let mut metrics = BTreeMap::new();
        metrics.insert("price".to_string(), round2(inputs.price));
        metrics.insert("sma_50".to_string(), round2(inputs.sma_50));
        metrics.insert("sma_150".to_string(), round2(inputs.sma_150));
        metrics.insert("sma_200".to_string(), round2(inputs.sma_200));
        metrics.insert("low_52w".to_string(), round2(inputs.low_52w));
        metrics.insert("high_52w".to_string(), round2(inputs.high_52w));
        if let Some(rsi) = inputs.rsi {
            metrics.insert("rsi".to_string(), round2(rsi));
        }
        if self.config.momentum == MomentumCriterion::RsRating {
            metrics.insert("rs_rating".to_string(), round2(inputs.momentum));
        }
        self.setup_metrics(series, inputs.price, &mut metrics);

        debug!(%symbol, %status, passed, "Trend template evaluated");

        let details = if status == Status::Pass {
            pass_reasons.clone()
        } else {
            fail_reasons.clone()
        };

        Ok(Verdict {
            strategy: NAME.to_string(),
            status,
            signal,
            score: Score::new(passed, TOTAL_CRITERIA),
            details,
            pass_reasons,
            fail_reasons,
            metrics,
        })
    }

    fn indicator_frame(&self, series: &PriceSeries) -> Option<IndicatorFrame> {
        if series.is_empty() {
            None
        } else {
            Some(IndicatorFrame::compute(series))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::RankedUniverse;
    use crate::PriceBar;
    use chrono::{Duration, NaiveDate};

    fn series_from(closes: impl IntoIterator<Item = f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let bars = closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| PriceBar::new(start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 1000.0))
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn uptrend() -> PriceSeries {
        series_from((0..300).map(|i| 10.0 + i as f64))
    }

    #[test]
    fn test_uptrend_passes_all_criteria() {
        let strategy = TrendTemplateStrategy::new(TrendTemplateConfig::default());
        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &uptrend(), &StrategyContext::default())
            .unwrap();

        assert_eq!(verdict.status, Status::Pass);
        assert_eq!(verdict.signal, Signal::Buy);
        assert_eq!(verdict.score.to_string(), "8/8");
        assert!(verdict.fail_reasons.is_empty());
        assert!(verdict.details[0].starts_with("Price (309.00) > 150/200 SMA"));
        assert_eq!(verdict.metric("pivot"), Some(310.0));
    }

    #[test]
    fn test_downtrend_fails() {
        let strategy = TrendTemplateStrategy::new(TrendTemplateConfig::default());
        let series = series_from((0..300).map(|i| 310.0 - i as f64));
        let verdict = strategy
            .evaluate(&Symbol::new("DOWN"), &series, &StrategyContext::default())
            .unwrap();

        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.signal, Signal::Neutral);
        assert!(verdict.score.passed < 8);
        assert_eq!(verdict.details, verdict.fail_reasons);
    }

    #[test]
    fn test_short_history_is_insufficient_data() {
        let strategy = TrendTemplateStrategy::new(TrendTemplateConfig::default());
        let series = series_from((0..100).map(|i| 10.0 + i as f64));
        let verdict = strategy
            .evaluate(&Symbol::new("NEW"), &series, &StrategyContext::default())
            .unwrap();

        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.score.to_string(), "0/8");
        assert_eq!(verdict.details, vec!["Insufficient Data (100 < 260 days)".to_string()]);
        assert!(verdict.metrics.is_empty());
    }

    #[test]
    fn test_rs_mode_requires_rankings() {
        let strategy = TrendTemplateStrategy::new(TrendTemplateConfig::default().ranked());
        let verdict = strategy
            .evaluate(&Symbol::new("TEST"), &uptrend(), &StrategyContext::default())
            .unwrap();
        assert_eq!(verdict.details, vec!["RS Rating Unavailable".to_string()]);
    }

    #[test]
    fn test_rs_mode_uses_batch_rating() {
        let strategy = TrendTemplateStrategy::new(TrendTemplateConfig::default().ranked());
        let series = uptrend();
        let laggard = series_from((0..300).map(|_| 50.0));

        let mut universe = std::collections::BTreeMap::new();
        universe.insert(Symbol::new("LEAD"), series.clone());
        universe.insert(Symbol::new("LAG"), laggard);
        let ctx = StrategyContext::default().with_rankings(RankedUniverse::rank(&universe));

        let lead = strategy.evaluate(&Symbol::new("LEAD"), &series, &ctx).unwrap();
        assert_eq!(lead.status, Status::Pass);
        assert_eq!(lead.metric("rs_rating"), Some(99.0));

        let lag = strategy.evaluate(&Symbol::new("LAG"), &series, &ctx).unwrap();
        assert_eq!(lag.status, Status::Fail);
        assert_eq!(lag.metric("rs_rating"), Some(49.5));
        assert!(lag.fail_reasons[0].starts_with("RS Rating Weak ("));
    }
}
