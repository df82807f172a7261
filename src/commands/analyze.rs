//! Analyze command implementation

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use trend_screener::cache::SqliteCache;
use trend_screener::chart::JsonChartSink;
use trend_screener::data::normalize_ticker;
use trend_screener::orchestrator::status_counts;
use trend_screener::{AnalysisReport, Config, StrategyManager, Symbol};

use super::{open_source, progress_bar};

pub fn run(config_path: &str, tickers: Vec<String>, json: bool, charts: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let source = open_source(&config)?;

    let mut manager = StrategyManager::new(&config, source);
    if charts || config.charts.enabled {
        info!("Writing chart data to {}", config.charts.output_dir);
        manager = manager.with_chart_sink(Arc::new(JsonChartSink::new(&config.charts.output_dir)));
    }
    if let Some(db) = &config.data.cache_db {
        manager = manager.with_analysis_store(SqliteCache::open(db)?);
    }

    let symbols: Vec<Symbol> = tickers
        .iter()
        .map(|t| normalize_ticker(t, &config.screener.exchange_suffix))
        .collect();
    info!("Analyzing {} tickers against {}", symbols.len(), config.screener.benchmark);

    let reports = if symbols.len() == 1 {
        vec![manager.analyze(&symbols[0])]
    } else {
        let pb = progress_bar(symbols.len());
        let reports = manager.analyze_batch_with_progress(&symbols, pb.clone());
        pb.finish_with_message("done");
        reports
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        print_report(report);
    }

    let (pass, fail, error) = status_counts(&reports);
    info!(pass, fail, error, "Analysis finished");
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("\n{}", "=".repeat(70));
    match report.price {
        Some(price) => println!("{}  @ {:.2}", report.ticker, price),
        None => println!("{}", report.ticker),
    }
    println!("{}", "=".repeat(70));

    if let Some(error) = &report.error {
        println!("  {error}");
        return;
    }

    for verdict in &report.strategies {
        println!(
            "\n  {} [{}] {} ({})",
            verdict.strategy, verdict.status, verdict.signal, verdict.score
        );
        for line in &verdict.details {
            println!("    - {line}");
        }
    }

    let summary = &report.summary;
    let outlook = if summary.overall_bullish {
        "BULLISH"
    } else if summary.overall_bearish {
        "BEARISH"
    } else {
        "MIXED"
    };
    println!(
        "\n  Summary: {}/{} strategies passed ({})",
        summary.count_passed, summary.count_total, outlook
    );
}
