//! Relative-strength ranking
//!
//! Scores each ticker by a weighted blend of multi-horizon rate of change and
//! converts the scores into batch percentiles (0-99). Ratings are only
//! meaningful within the batch that produced them.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::indicators::rate_of_change;
use crate::{PriceSeries, Symbol};

/// One rate-of-change horizon and its weight in the composite
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Horizon {
    pub months: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Trading bars per month (default: 21)
    pub bars_per_month: usize,
    pub horizons: Vec<Horizon>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            bars_per_month: 21,
            horizons: vec![
                Horizon { months: 3, weight: 0.4 },
                Horizon { months: 6, weight: 0.2 },
                Horizon { months: 9, weight: 0.2 },
                Horizon { months: 12, weight: 0.2 },
            ],
        }
    }
}

impl RankerConfig {
    /// Weighted composite of rate of change across horizons
    ///
    /// A horizon without enough history contributes 0, which deliberately
    /// drags short-history tickers down the ranking.
    pub fn raw_score(&self, series: &PriceSeries) -> f64 {
        let closes = series.closes();
        let score: f64 = self
            .horizons
            .iter()
            .map(|h| {
                let roc = rate_of_change(&closes, h.months * self.bars_per_month).unwrap_or(0.0);
                h.weight * roc
            })
            .sum();
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankEntry {
    pub raw_score: f64,
    pub rating: f64,
}

/// Ticker to RS percentile for one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankedUniverse {
    entries: BTreeMap<Symbol, RankEntry>,
}

impl RankedUniverse {
    /// Rank a batch with the default horizons
    pub fn rank<'a, I>(series: I) -> Self
    where
        I: IntoIterator<Item = (&'a Symbol, &'a PriceSeries)>,
    {
        Self::rank_with(&RankerConfig::default(), series)
    }

    pub fn rank_with<'a, I>(config: &RankerConfig, series: I) -> Self
    where
        I: IntoIterator<Item = (&'a Symbol, &'a PriceSeries)>,
    {
        let scores = series
            .into_iter()
            .map(|(symbol, s)| (symbol.clone(), config.raw_score(s)))
            .collect();
        Self::from_raw_scores(scores)
    }

    /// Percentile-rank precomputed raw scores
    ///
    /// Ties share the average of their 1-based ranks; the percentile is
    /// `average_rank / n * 99`.
    pub fn from_raw_scores(scores: Vec<(Symbol, f64)>) -> Self {
        let n = scores.len();
        let sorted: Vec<(Symbol, f64)> = scores
            .into_iter()
            .map(|(s, v)| (s, if v.is_finite() { v } else { 0.0 }))
            .sorted_by_key(|(_, v)| OrderedFloat(*v))
            .collect();

        let mut entries = BTreeMap::new();
        for (_, group) in &sorted
            .iter()
            .enumerate()
            .chunk_by(|(_, (_, v))| OrderedFloat(*v))
        {
            let group: Vec<_> = group.collect();
            let first_rank = group[0].0 + 1;
            let last_rank = group[group.len() - 1].0 + 1;
            let avg_rank = (first_rank + last_rank) as f64 / 2.0;
            let rating = avg_rank / n as f64 * 99.0;
            for (_, (symbol, raw)) in group {
                entries.insert(
                    symbol.clone(),
                    RankEntry {
                        raw_score: *raw,
                        rating,
                    },
                );
            }
        }

        debug!(tickers = n, "Ranked relative strength");
        Self { entries }
    }

    pub fn rating(&self, symbol: &Symbol) -> Option<f64> {
        self.entries.get(symbol).map(|e| e.rating)
    }

    pub fn raw_score(&self, symbol: &Symbol) -> Option<f64> {
        self.entries.get(symbol).map(|e| e.raw_score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &RankEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn scores(values: &[(&str, f64)]) -> Vec<(Symbol, f64)> {
        values.iter().map(|(s, v)| (Symbol::new(s), *v)).collect()
    }

    #[test]
    fn test_percentiles_span_batch() {
        let ranked = RankedUniverse::from_raw_scores(scores(&[
            ("A", 10.0),
            ("B", -5.0),
            ("C", 30.0),
            ("D", 20.0),
        ]));
        assert_relative_eq!(ranked.rating(&Symbol::new("B")).unwrap(), 24.75);
        assert_relative_eq!(ranked.rating(&Symbol::new("A")).unwrap(), 49.5);
        assert_relative_eq!(ranked.rating(&Symbol::new("D")).unwrap(), 74.25);
        assert_relative_eq!(ranked.rating(&Symbol::new("C")).unwrap(), 99.0);
    }

    #[test]
    fn test_ties_share_percentile() {
        let ranked = RankedUniverse::from_raw_scores(scores(&[("A", 1.0), ("B", 1.0), ("C", 2.0)]));
        let a = ranked.rating(&Symbol::new("A")).unwrap();
        assert_eq!(a, ranked.rating(&Symbol::new("B")).unwrap());
        assert_relative_eq!(a, 1.5 / 3.0 * 99.0);
    }

    #[test]
    fn test_invariant_under_positive_scaling() {
        let base = scores(&[("A", 3.0), ("B", -1.0), ("C", 7.5), ("D", 0.5)]);
        let scaled = base.iter().map(|(s, v)| (s.clone(), v * 4.2)).collect();
        let a = RankedUniverse::from_raw_scores(base);
        let b = RankedUniverse::from_raw_scores(scaled);
        for (symbol, entry) in a.iter() {
            assert_eq!(Some(entry.rating), b.rating(symbol));
        }
    }

    #[test]
    fn test_batch_membership_changes_rank() {
        let small = RankedUniverse::from_raw_scores(scores(&[("A", 1.0), ("B", 2.0)]));
        let large =
            RankedUniverse::from_raw_scores(scores(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]));
        assert_ne!(small.rating(&Symbol::new("B")), large.rating(&Symbol::new("B")));
    }

    #[test]
    fn test_short_history_contributes_zero() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        // 100 bars: only the 3-month horizon (63 bars) is available
        let bars = (0..100)
            .map(|i| PriceBar::from_close(start + Duration::days(i), 100.0 + i as f64))
            .collect();
        let series = PriceSeries::new(bars).unwrap();
        let past = 100.0 + 37.0;
        let expected = 0.4 * (199.0 - past) / past * 100.0;
        assert_relative_eq!(RankerConfig::default().raw_score(&series), expected, epsilon = 1e-9);
    }
}
