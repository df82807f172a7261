//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for data locations and worker count.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ScreenError;
use crate::ranker::RankerConfig;
use crate::strategies::dual_momentum::DualMomentumConfig;
use crate::strategies::trend_template::TrendTemplateConfig;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub screener: ScreenerConfig,
    pub data: DataConfig,
    pub trend_template: TrendTemplateConfig,
    pub dual_momentum: DualMomentumConfig,
    pub ranker: RankerConfig,
    pub charts: ChartConfig,
    pub portfolio: PortfolioConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            info!("Loading configuration from {}", path.as_ref().display());
            Self::from_file(path)
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            let mut config = Config::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("SCREENER_DATA_DIR") {
            self.data.data_dir = dir;
        }
        if let Ok(db) = std::env::var("SCREENER_CACHE_DB") {
            self.data.cache_db = Some(db);
        }
        if let Ok(workers) = std::env::var("SCREENER_WORKERS") {
            self.screener.workers = workers
                .parse()
                .with_context(|| format!("SCREENER_WORKERS is not a number: {workers}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.screener.workers == 0 {
            return Err(ScreenError::Config("screener.workers must be at least 1".into()).into());
        }
        if self.dual_momentum.lookback_days == 0 {
            return Err(
                ScreenError::Config("dual_momentum.lookback_days must be at least 1".into()).into(),
            );
        }
        if self.trend_template.min_bars < crate::indicators::YEAR_BARS {
            return Err(ScreenError::Config(format!(
                "trend_template.min_bars must cover the {}-bar 52-week window",
                crate::indicators::YEAR_BARS
            ))
            .into());
        }
        Ok(())
    }

    pub fn benchmark(&self) -> Symbol {
        Symbol::new(&self.screener.benchmark)
    }
}

/// Screening universe and batch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Benchmark index for relative momentum
    pub benchmark: String,
    /// Suffix appended to bare tickers (e.g. ".NS" for NSE listings)
    pub exchange_suffix: String,
    /// Concurrent tickers in a batch, bounded by the data source's rate limits
    pub workers: usize,
    /// Default tickers for `screen` when none are given
    pub universe: Vec<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            benchmark: "^NSEI".to_string(),
            exchange_suffix: ".NS".to_string(),
            workers: 5,
            universe: [
                "RELIANCE", "TCS", "INFY", "HDFCBANK", "ICICIBANK", "SBIN", "BHARTIARTL", "ITC",
                "KOTAKBANK", "LT", "AXISBANK", "HINDUNILVR", "BAJFINANCE", "MARUTI", "SUNPHARMA",
                "TITAN", "HAL", "TRENT", "BEL",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ScreenerConfig {
    pub fn universe(&self) -> Vec<Symbol> {
        self.universe.iter().map(Symbol::new).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// `<data_dir>/<TICKER>.csv` files
    Csv,
    /// Daily history over HTTP
    Http,
}

/// Price history source and cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSourceKind,
    pub data_dir: String,
    /// SQLite price cache; `None` disables caching
    pub cache_db: Option<String>,
    pub base_url: String,
    /// Calendar days requested on a cold fetch (default: five years)
    pub history_days: i64,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSourceKind::Csv,
            data_dir: "data".to_string(),
            cache_db: Some("cache/prices.db".to_string()),
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            history_days: 5 * 365,
            request_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub enabled: bool,
    pub output_dir: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: "charts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub ledger_path: String,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            ledger_path: "portfolio.json".to_string(),
        }
    }
}
