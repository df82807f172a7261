//! Trend Screener
//!
//! Screens equities against a Minervini-style trend template and a dual
//! momentum rule, ranks batches by relative strength, caches daily price
//! history and keeps a small weighted-average-cost holdings ledger.

pub mod cache;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod orchestrator;
pub mod portfolio;
pub mod ranker;
pub mod screener;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use error::{ScreenError, ScreenResult};
pub use orchestrator::{AnalysisReport, StrategyManager};
pub use strategies::{Strategy, StrategyContext, Verdict};
pub use types::*;
