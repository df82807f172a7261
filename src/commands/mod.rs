//! Subcommand implementations

pub mod analyze;
pub mod download;
pub mod portfolio;
pub mod screen;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use trend_screener::data::{self, normalize_ticker, PriceSource};
use trend_screener::{Config, Symbol};

/// Comma-separated tickers, or the configured universe when none are given
pub(crate) fn resolve_tickers(config: &Config, tickers: Option<&str>) -> Vec<Symbol> {
    let suffix = &config.screener.exchange_suffix;
    match tickers {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| normalize_ticker(t, suffix))
            .collect(),
        None => config
            .screener
            .universe
            .iter()
            .map(|t| normalize_ticker(t, suffix))
            .collect(),
    }
}

pub(crate) fn open_source(config: &Config) -> Result<Arc<dyn PriceSource>> {
    Ok(Arc::from(data::build_source(&config.data)?))
}

pub(crate) fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
    );
    pb
}
