//! Core data types used across the screener

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use thiserror::Error;

/// Validation errors for price bars and series
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low}) on {date}")]
    HighLessThanLow { date: NaiveDate, high: f64, low: f64 },

    #[error("volume ({volume}) must be >= 0 on {date}")]
    NegativeVolume { date: NaiveDate, volume: f64 },

    #[error("prices must be positive and finite on {date}: close={close}")]
    NonPositivePrice { date: NaiveDate, close: f64 },

    #[error("bars out of order: {current} does not follow {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },
}

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar with open/high/low all equal to close. Handy for close-only sources.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self::new(date, close, close, close, close, 0.0)
    }

    pub fn validate(&self) -> Result<(), BarValidationError> {
        if !(self.close.is_finite() && self.close > 0.0) {
            return Err(BarValidationError::NonPositivePrice {
                date: self.date,
                close: self.close,
            });
        }
        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                date: self.date,
                high: self.high,
                low: self.low,
            });
        }
        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume {
                date: self.date,
                volume: self.volume,
            });
        }
        Ok(())
    }
}

/// Ordered daily history for one symbol.
///
/// Dates are strictly increasing. Strategies only ever borrow a series; derived
/// columns are computed into their own vectors aligned to `bars`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build from bars that must already be strictly ascending by date.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, BarValidationError> {
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(BarValidationError::OutOfOrder {
                    previous: pair[0].date,
                    current: pair[1].date,
                });
            }
        }
        Ok(Self { bars })
    }

    /// Sort by date and keep the last bar seen for any duplicated date.
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    /// Index of the bar dated `date`, if present.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Closes of both series restricted to the dates they share.
    ///
    /// Both inputs are sorted, so this is a single merge pass.
    pub fn aligned_closes(&self, other: &PriceSeries) -> (Vec<f64>, Vec<f64>) {
        let (mut i, mut j) = (0, 0);
        let mut left = Vec::new();
        let mut right = Vec::new();
        while i < self.bars.len() && j < other.bars.len() {
            match self.bars[i].date.cmp(&other.bars[j].date) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    left.push(self.bars[i].close);
                    right.push(other.bars[j].close);
                    i += 1;
                    j += 1;
                }
            }
        }
        (left, right)
    }

    /// Merge newer bars into this series. Bars for an existing date replace it.
    pub fn merged(&self, newer: &[PriceBar]) -> PriceSeries {
        let mut all = self.bars.clone();
        all.extend_from_slice(newer);
        PriceSeries::from_unsorted(all)
    }
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every report, verdict map and worker closure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Outcome of a single strategy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "PASS"),
            Status::Fail => write!(f, "FAIL"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// Trading signal attached to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Monetary value with precise decimal arithmetic
///
/// Wraps `rust_decimal::Decimal` so weighted-average cost never drifts the way
/// repeated f64 averaging does.
///
/// # Example
/// ```
/// use trend_screener::Money;
/// let price = Money::from_f64(100.50);
/// let qty = Money::from_f64(2.0);
/// let total = price * qty;
/// assert_eq!(total.to_f64(), 201.0);
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from f64. NaN and infinities map to zero.
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}
