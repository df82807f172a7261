//! Minervini Trend Template Strategy
//!
//! Eight trend and momentum criteria evaluated on the latest bar. A ticker
//! passes only when every criterion holds.

mod config;
mod strategy;

pub use config::{MomentumCriterion, TrendTemplateConfig};
pub use strategy::TrendTemplateStrategy;

use crate::strategies::Strategy;
use crate::Config;

/// Create strategy from config (called by the registry)
pub fn create(config: &Config) -> Box<dyn Strategy> {
    Box::new(TrendTemplateStrategy::new(config.trend_template.clone()))
}
