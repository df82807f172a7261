//! Screening Strategies Module
//!
//! Every strategy consumes the same `PriceSeries` contract and produces a
//! [`Verdict`]. The orchestrator owns an ordered list of boxed strategies and
//! hands each one the same read-only [`StrategyContext`].

pub mod dual_momentum;
pub mod trend_template;

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ScreenResult;
use crate::indicators::IndicatorFrame;
use crate::ranker::RankedUniverse;
use crate::{Config, PriceSeries, Signal, Status, Symbol};

// =============================================================================
// Strategy Trait
// =============================================================================

/// Screening strategy trait
///
/// Expected conditions (short history, benchmark misalignment) must come back
/// as FAIL verdicts. An `Err` is reserved for faults and is turned into an
/// ERROR verdict by the orchestrator.
pub trait Strategy: Send + Sync {
    /// Display name, also the key in the report's strategy map
    fn name(&self) -> &'static str;

    /// Minimum number of bars the strategy needs to reach a decision
    fn min_bars(&self) -> usize;

    /// Evaluate the most recent bar of `series`
    fn evaluate(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        ctx: &StrategyContext,
    ) -> ScreenResult<Verdict>;

    /// Indicator columns worth charting for this strategy, if any
    fn indicator_frame(&self, _series: &PriceSeries) -> Option<IndicatorFrame> {
        None
    }
}

/// Shared read-only inputs for one batch run
///
/// Built once per batch and shared behind `Arc`, so concurrent workers never
/// observe each other's state.
#[derive(Debug, Clone, Default)]
pub struct StrategyContext {
    pub benchmark: Option<Arc<PriceSeries>>,
    pub rankings: Option<Arc<RankedUniverse>>,
}

impl StrategyContext {
    pub fn with_benchmark(mut self, benchmark: Option<PriceSeries>) -> Self {
        self.benchmark = benchmark.map(Arc::new);
        self
    }

    pub fn with_rankings(mut self, rankings: RankedUniverse) -> Self {
        self.rankings = Some(Arc::new(rankings));
        self
    }
}

/// Build the registered strategy list in evaluation order
pub fn create_strategies(config: &Config) -> Vec<Box<dyn Strategy>> {
    vec![
        trend_template::create(config),
        dual_momentum::create(config),
    ]
}

// =============================================================================
// Verdict
// =============================================================================

/// Criteria satisfied out of criteria evaluated, displayed as `k/n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub passed: usize,
    pub total: usize,
}

impl Score {
    pub fn new(passed: usize, total: usize) -> Self {
        Self { passed, total }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.passed, self.total)
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of one strategy for one ticker
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub strategy: String,
    pub status: Status,
    pub signal: Signal,
    pub score: Score,
    /// Headline lines in display order
    pub details: Vec<String>,
    pub pass_reasons: Vec<String>,
    pub fail_reasons: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
}

impl Verdict {
    /// FAIL verdict carrying a single reason and no metrics
    pub fn fail(strategy: &str, reason: impl Into<String>, total: usize) -> Self {
        let reason = reason.into();
        Self {
            strategy: strategy.to_string(),
            status: Status::Fail,
            signal: Signal::Neutral,
            score: Score::new(0, total),
            details: vec![reason.clone()],
            pass_reasons: Vec::new(),
            fail_reasons: vec![reason],
            metrics: BTreeMap::new(),
        }
    }

    /// ERROR verdict whose only detail is the fault message
    pub fn error(strategy: &str, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.to_string(),
            status: Status::Error,
            signal: Signal::Neutral,
            score: Score::new(0, 0),
            details: vec![message.into()],
            pass_reasons: Vec::new(),
            fail_reasons: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Round to one decimal place, used for percentage metrics
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places, used for price metrics
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
