//! Dual Momentum Strategy
//!
//! Absolute momentum (positive trailing return) combined with relative
//! momentum against a benchmark over the same window.

mod config;
mod strategy;

pub use config::DualMomentumConfig;
pub use strategy::DualMomentumStrategy;

use crate::strategies::Strategy;
use crate::Config;

/// Create strategy from config (called by the registry)
pub fn create(config: &Config) -> Box<dyn Strategy> {
    Box::new(DualMomentumStrategy::new(config.dual_momentum.clone()))
}
