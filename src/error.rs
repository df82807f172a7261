//! Screener error taxonomy
//!
//! `InsufficientData` and `Misaligned` are expected outcomes that strategies
//! fold into FAIL verdicts. `DataUnavailable` ends a single ticker's report.
//! `StrategyFault` is converted into an ERROR verdict by the orchestrator.

use thiserror::Error;

use crate::types::BarValidationError;

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("insufficient data for {ticker}: have {bars} bars, need {required}")]
    InsufficientData {
        ticker: String,
        bars: usize,
        required: usize,
    },

    #[error("no price data available for {ticker}")]
    DataUnavailable { ticker: String },

    #[error("{ticker} shares only {common} dates with the benchmark, need {required}")]
    Misaligned {
        ticker: String,
        common: usize,
        required: usize,
    },

    #[error("strategy {strategy} failed: {message}")]
    StrategyFault { strategy: String, message: String },

    #[error(transparent)]
    InvalidSeries(#[from] BarValidationError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScreenError {
    pub fn fault(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        ScreenError::StrategyFault {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

pub type ScreenResult<T> = Result<T, ScreenError>;
