//! Screen command implementation

use anyhow::Result;
use tracing::info;
use trend_screener::screener::Screener;
use trend_screener::Config;

use super::{open_source, progress_bar, resolve_tickers};

pub fn run(config_path: &str, tickers: Option<String>, passing: bool, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let symbols = resolve_tickers(&config, tickers.as_deref());
    if symbols.is_empty() {
        anyhow::bail!("No tickers to screen");
    }

    let screener = Screener::new(&config, open_source(&config)?);
    let pb = progress_bar(symbols.len());
    let report = screener.screen_with_progress(&symbols, pb.clone());
    pb.finish_with_message(format!("{} passing", report.passing().count()));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(96));
    println!(
        "{:<16} {:>10} {:>6} {:>6} {:>6} {:>10} {:>10} {:>5}",
        "TICKER", "PRICE", "RS", "STATUS", "SCORE", "PIVOT", "STOP", "VCP"
    );
    println!("{}", "-".repeat(96));

    let fmt_opt = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string());
    for candidate in report.by_rs_rating() {
        if passing && candidate.status != trend_screener::Status::Pass {
            continue;
        }
        println!(
            "{:<16} {:>10.2} {:>6} {:>6} {:>6} {:>10} {:>10} {:>5}",
            candidate.ticker.as_str(),
            candidate.price,
            candidate
                .rs_rating
                .map(|r| format!("{r:.0}"))
                .unwrap_or_else(|| "-".to_string()),
            candidate.status.to_string(),
            candidate.score.to_string(),
            fmt_opt(candidate.pivot),
            fmt_opt(candidate.stop_loss),
            if candidate.vcp { "yes" } else { "" },
        );
    }
    println!("{}", "=".repeat(96));

    if !report.missing.is_empty() {
        let missing: Vec<&str> = report.missing.iter().map(|s| s.as_str()).collect();
        println!("No data: {}", missing.join(", "));
    }

    info!(
        screened = report.candidates.len(),
        passed = report.passing().count(),
        "Screen finished"
    );
    Ok(())
}
