//! Trend Template configuration

use serde::{Deserialize, Serialize};

/// Source of the eighth (momentum) criterion
///
/// The two are different signals, not thresholds of the same one: RSI is a
/// per-ticker oscillator while the RS rating only exists relative to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumCriterion {
    /// RSI(14) >= `rsi_threshold`
    Rsi,
    /// Batch RS percentile >= `rs_threshold`
    RsRating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendTemplateConfig {
    /// Bars required before any criterion is evaluated (default: 260)
    pub min_bars: usize,

    /// Price must sit this multiple above the 52-week low (default: 1.30)
    pub low_multiple: f64,

    /// Price must sit at or above this fraction of the 52-week high (default: 0.75)
    pub high_multiple: f64,

    pub momentum: MomentumCriterion,

    /// Minimum RSI(14) in `rsi` mode (default: 50)
    pub rsi_threshold: f64,

    /// Minimum RS percentile in `rs_rating` mode (default: 70)
    pub rs_threshold: f64,

    /// Bars used for the breakout pivot (default: 20)
    pub pivot_bars: usize,

    /// Suggested stop distance below price (default: 0.08)
    pub stop_loss_pct: f64,

    /// Short and long windows for volatility contraction (default: 10 / 60)
    pub vcp_short: usize,
    pub vcp_long: usize,

    /// Short-window deviation must be below this share of the long one (default: 0.5)
    pub vcp_ratio: f64,
}

impl Default for TrendTemplateConfig {
    fn default() -> Self {
        Self {
            min_bars: 260,
            low_multiple: 1.30,
            high_multiple: 0.75,
            momentum: MomentumCriterion::Rsi,
            rsi_threshold: 50.0,
            rs_threshold: 70.0,
            pivot_bars: 20,
            stop_loss_pct: 0.08,
            vcp_short: 10,
            vcp_long: 60,
            vcp_ratio: 0.5,
        }
    }
}

impl TrendTemplateConfig {
    /// Same thresholds with the RS-rating momentum criterion
    pub fn ranked(&self) -> Self {
        Self {
            momentum: MomentumCriterion::RsRating,
            ..self.clone()
        }
    }
}
