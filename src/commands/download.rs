//! Download command implementation
//!
//! Pulls every ticker through the configured source, which refreshes the
//! price cache, and optionally exports each series to CSV.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};
use trend_screener::data::save_csv;
use trend_screener::{Config, StrategyManager};

use super::{open_source, progress_bar, resolve_tickers};

pub fn run(config_path: &str, tickers: Option<String>, output: Option<String>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let mut symbols = resolve_tickers(&config, tickers.as_deref());
    let benchmark = config.benchmark();
    if !symbols.contains(&benchmark) {
        symbols.push(benchmark);
    }

    let source = open_source(&config)?;
    let min_bars = StrategyManager::new(&config, source.clone()).min_bars();

    let pb = progress_bar(symbols.len());
    let mut downloaded = 0usize;
    for symbol in &symbols {
        pb.set_message(symbol.to_string());
        match source.price_history(symbol, min_bars) {
            Ok(Some(series)) => {
                downloaded += 1;
                info!("{}: {} bars through {:?}", symbol, series.len(), series.last_date());
                if let Some(dir) = &output {
                    let path = Path::new(dir).join(format!("{}.csv", symbol.as_str()));
                    save_csv(&series, &path)?;
                }
            }
            Ok(None) => warn!("{}: no data", symbol),
            Err(e) => warn!("{}: download failed: {:#}", symbol, e),
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{downloaded}/{} downloaded", symbols.len()));

    info!("Downloaded {} of {} tickers", downloaded, symbols.len());
    Ok(())
}
