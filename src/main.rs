//! Trend screener - main entry point
//!
//! This binary provides four subcommands:
//! - analyze: Run every strategy against one or more tickers
//! - screen: Rank a universe and run the trend template on it
//! - download: Refresh cached price history
//! - portfolio: Manage the holdings ledger

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "trend-screener")]
#[command(about = "Trend template and dual momentum equity screener", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "configs/screener.json")]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze tickers with every registered strategy
    Analyze {
        /// Tickers to analyze. Bare symbols get the configured exchange suffix
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,

        /// Write chart data for each analyzed ticker
        #[arg(long)]
        charts: bool,
    },

    /// Rank a universe by relative strength and screen it
    Screen {
        /// Tickers to screen (comma-separated). Defaults to the configured universe
        #[arg(short, long)]
        tickers: Option<String>,

        /// Only show passing candidates
        #[arg(long)]
        passing: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh the price cache and optionally export CSV files
    Download {
        /// Tickers to download (comma-separated). Defaults to the configured universe
        #[arg(short, long)]
        tickers: Option<String>,

        /// Write `<output>/<TICKER>.csv` for each ticker
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage the holdings ledger
    Portfolio {
        #[command(subcommand)]
        action: commands::portfolio::Action,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Batch commands keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Analyze { tickers, .. } => ("analyze", tickers.len() > 1),
        Commands::Screen { .. } => ("screen", true),
        Commands::Download { .. } => ("download", true),
        Commands::Portfolio { .. } => ("portfolio", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Analyze {
            tickers,
            json,
            charts,
        } => commands::analyze::run(&cli.config, tickers, json, charts),

        Commands::Screen {
            tickers,
            passing,
            json,
        } => commands::screen::run(&cli.config, tickers, passing, json),

        Commands::Download { tickers, output } => {
            commands::download::run(&cli.config, tickers, output)
        }

        Commands::Portfolio { action } => commands::portfolio::run(&cli.config, action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_with_console_and_file() {
        setup_logging(false, "logging_selftest", false).unwrap();
        info!("console and file layers installed");

        let written = std::fs::read_dir("logs")
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("logging_selftest_"));
        assert!(written);
    }
}
