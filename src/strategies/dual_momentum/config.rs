//! Dual Momentum configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DualMomentumConfig {
    /// Return window in trading bars (default: 252, one year)
    pub lookback_days: usize,

    /// Minimum return for absolute momentum (default: 0.0)
    pub risk_free_return: f64,
}

impl Default for DualMomentumConfig {
    fn default() -> Self {
        Self {
            lookback_days: 252,
            risk_free_return: 0.0,
        }
    }
}
