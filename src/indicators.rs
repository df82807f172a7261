//! Technical indicators
//!
//! Pure functions over an ordered series. Every function returns a vector
//! aligned to its input where `None` means the window has not filled yet.

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::types::PriceSeries;

/// Trading days in the rolling 52-week window
pub const YEAR_BARS: usize = 260;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 < period {
            result.push(None);
        } else {
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate Exponential Moving Average
///
/// Smoothing factor `2 / (period + 1)`, seeded from the first value with no
/// warm-up bias correction.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    smooth(values, multiplier)
}

/// Recursive exponential smoothing `y = y_prev + alpha * (x - y_prev)`, `y0 = x0`.
fn smooth(values: &[f64], alpha: f64) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &value in values {
        let next = match prev {
            None => value,
            Some(p) => p + alpha * (value - p),
        };
        prev = Some(next);
        result.push(Some(next));
    }
    result
}

/// Calculate RSI (Relative Strength Index) with Wilder's smoothing
///
/// Average gain and loss use recursive smoothing with `alpha = 1 / period`,
/// not a rolling mean. The first bar has no delta and therefore no value.
/// A zero average loss saturates the index at 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    gains.push(0.0);
    losses.push(0.0);
    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let alpha = 1.0 / period as f64;
    let avg_gains = smooth(&gains, alpha);
    let avg_losses = smooth(&losses, alpha);

    let mut rsi_values = Vec::with_capacity(values.len());
    rsi_values.push(None);
    for i in 1..values.len() {
        match (avg_gains[i], avg_losses[i]) {
            (Some(avg_gain), Some(avg_loss)) => {
                if avg_loss == 0.0 {
                    rsi_values.push(Some(100.0));
                } else {
                    let rs = avg_gain / avg_loss;
                    rsi_values.push(Some(100.0 - 100.0 / (1.0 + rs)));
                }
            }
            _ => rsi_values.push(None),
        }
    }

    rsi_values
}

/// MACD line, signal line and histogram aligned to the input
#[derive(Debug, Clone, Default, Serialize)]
pub struct Macd {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Calculate MACD (fast EMA - slow EMA, EMA signal of the difference)
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // The signal EMA is seeded from the first defined MACD value.
    let start = line.iter().position(Option::is_some).unwrap_or(line.len());
    let defined: Vec<f64> = line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut signal_line = vec![None; start];
    signal_line.extend(ema(&defined, signal));

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Trailing maximum over `period` points
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

/// Trailing minimum over `period` points
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

/// Trailing sample standard deviation over `period` points
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }
    rolling(values, period, |w| w.iter().std_dev())
}

fn rolling<F>(values: &[f64], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                Some(f(&values[i + 1 - period..=i]))
            }
        })
        .collect()
}

/// Whether each moving-average value is strictly above the value `lag` bars earlier
pub fn trend_up(ma: &[Option<f64>], lag: usize) -> Vec<Option<bool>> {
    (0..ma.len())
        .map(|i| {
            if i < lag {
                return None;
            }
            Some(ma[i]? > ma[i - lag]?)
        })
        .collect()
}

/// Percentage change between the last value and the value `bars` points back
///
/// The reference point is index `len - bars`. Returns `None` when history is
/// shorter than `bars` or the reference value cannot be divided by.
pub fn rate_of_change(values: &[f64], bars: usize) -> Option<f64> {
    if bars == 0 || values.len() < bars {
        return None;
    }
    let current = *values.last()?;
    let past = values[values.len() - bars];
    if !past.is_finite() || !current.is_finite() || past == 0.0 {
        return None;
    }
    Some((current - past) / past * 100.0)
}

/// Last value of an indicator column, flattening the "no value" case
pub fn latest(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

/// Derived indicator columns for one series, keyed by the series' dates
///
/// Computed fresh for each evaluation and handed to the chart sink.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorFrame {
    pub dates: Vec<NaiveDate>,
    pub close: Vec<f64>,
    pub sma_50: Vec<Option<f64>>,
    pub sma_150: Vec<Option<f64>>,
    pub sma_200: Vec<Option<f64>>,
    pub rsi_14: Vec<Option<f64>>,
    pub macd: Macd,
    pub high_52w: Vec<Option<f64>>,
    pub low_52w: Vec<Option<f64>>,
    pub sma_200_trending: Vec<Option<bool>>,
}

/// Values of every column on the most recent bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub close: f64,
    pub sma_50: Option<f64>,
    pub sma_150: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub sma_200_trending: Option<bool>,
}

impl IndicatorFrame {
    pub fn compute(series: &PriceSeries) -> Self {
        let close = series.closes();
        let sma_200 = sma(&close, 200);
        let sma_200_trending = trend_up(&sma_200, 20);

        Self {
            dates: series.dates(),
            sma_50: sma(&close, 50),
            sma_150: sma(&close, 150),
            rsi_14: rsi(&close, 14),
            macd: macd(&close, 12, 26, 9),
            high_52w: rolling_max(&close, YEAR_BARS),
            low_52w: rolling_min(&close, YEAR_BARS),
            sma_200,
            sma_200_trending,
            close,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn latest(&self) -> Option<FrameSnapshot> {
        let close = *self.close.last()?;
        Some(FrameSnapshot {
            close,
            sma_50: latest(&self.sma_50),
            sma_150: latest(&self.sma_150),
            sma_200: latest(&self.sma_200),
            rsi_14: latest(&self.rsi_14),
            high_52w: latest(&self.high_52w),
            low_52w: latest(&self.low_52w),
            sma_200_trending: self.sma_200_trending.last().copied().flatten(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
    }

    #[test]
    fn test_ema_seeded_from_first_value() {
        let values = vec![1.0, 2.0, 3.0];
        let result = ema(&values, 3);

        // alpha = 0.5
        assert_eq!(result[0], Some(1.0));
        assert_eq!(result[1], Some(1.5));
        assert_eq!(result[2], Some(2.25));
    }

    #[test]
    fn test_rsi_wilder_smoothing() {
        let values = vec![10.0, 11.0, 10.5];
        let result = rsi(&values, 2);

        assert_eq!(result[0], None);
        // gains: 0, 1, 0 -> 0, 0.5, 0.25 ; losses: 0, 0, 0.5 -> 0, 0, 0.25
        assert_eq!(result[1], Some(100.0));
        assert_relative_eq!(result[2].unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rsi_monotonic_extremes() {
        let up: Vec<f64> = (0..100).map(|i| 10.0 + i as f64).collect();
        assert_eq!(latest(&rsi(&up, 14)), Some(100.0));

        let down: Vec<f64> = (0..300).map(|i| 400.0 - i as f64).collect();
        assert!(latest(&rsi(&down, 14)).unwrap() < 1e-6);
    }

    #[test]
    fn test_macd_alignment() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let out = macd(&values, 12, 26, 9);
        assert_eq!(out.line.len(), values.len());
        assert_eq!(out.signal.len(), values.len());
        let last = values.len() - 1;
        assert_relative_eq!(
            out.histogram[last].unwrap(),
            out.line[last].unwrap() - out.signal[last].unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rolling_extremes() {
        let values = vec![3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(rolling_max(&values, 3), vec![None, None, Some(4.0), Some(4.0), Some(5.0)]);
        assert_eq!(rolling_min(&values, 3), vec![None, None, Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_rolling_std_is_sample_deviation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let result = rolling_std(&values, 8);
        assert_relative_eq!(result[7].unwrap(), 2.138089935299395, epsilon = 1e-9);
    }

    #[test]
    fn test_trend_up_needs_lagged_value() {
        let ma = vec![None, Some(1.0), Some(2.0), Some(1.5)];
        assert_eq!(trend_up(&ma, 2), vec![None, None, None, Some(true)]);
    }

    #[test]
    fn test_rate_of_change() {
        let values = vec![100.0, 110.0, 120.0, 150.0];
        assert_relative_eq!(rate_of_change(&values, 4).unwrap(), 50.0);
        assert_relative_eq!(rate_of_change(&values, 2).unwrap(), 25.0);
        assert_eq!(rate_of_change(&values, 5), None);
    }
}
