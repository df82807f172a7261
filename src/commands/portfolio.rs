//! Portfolio command implementation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use trend_screener::cache::SqliteCache;
use trend_screener::data::normalize_ticker;
use trend_screener::portfolio::Ledger;
use trend_screener::{Config, Money};

use super::open_source;

#[derive(Subcommand, Debug)]
pub enum Action {
    /// List portfolios and their holdings
    List,

    /// Create a new named portfolio
    Create { name: String },

    /// Buy into a holding (averages cost with an existing position)
    Add {
        ticker: String,
        quantity: Decimal,
        price: Decimal,

        /// Portfolio id
        #[arg(short, long, default_value = "1")]
        portfolio: u32,

        /// Purchase date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Overwrite a holding's quantity and average price (0 removes it)
    Update {
        ticker: String,
        quantity: Decimal,
        price: Decimal,

        #[arg(short, long, default_value = "1")]
        portfolio: u32,
    },

    /// Remove a holding
    Remove {
        ticker: String,

        #[arg(short, long, default_value = "1")]
        portfolio: u32,
    },

    /// Value every portfolio at the latest available closes
    Summary,
}

pub fn run(config_path: &str, action: Action) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let ledger_path = &config.portfolio.ledger_path;
    let mut ledger = Ledger::load(ledger_path)?;
    let suffix = &config.screener.exchange_suffix;

    match action {
        Action::List => print_holdings(&ledger),

        Action::Create { name } => {
            let id = ledger.create_portfolio(&name)?;
            ledger.save(ledger_path)?;
            println!("Created portfolio {id}: {name}");
        }

        Action::Add {
            ticker,
            quantity,
            price,
            portfolio,
            date,
        } => {
            let date = match date {
                Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("Invalid date: {d}"))?,
                None => chrono::Local::now().date_naive(),
            };
            let symbol = normalize_ticker(&ticker, suffix);
            let holding =
                ledger.add_holding(portfolio, symbol, quantity, Money::new(price), date)?;
            println!(
                "{}: {} @ {} (avg)",
                holding.ticker,
                holding.quantity,
                holding.avg_price.round_dp(2)
            );
            ledger.save(ledger_path)?;
        }

        Action::Update {
            ticker,
            quantity,
            price,
            portfolio,
        } => {
            let symbol = normalize_ticker(&ticker, suffix);
            ledger.update_holding(portfolio, &symbol, quantity, Money::new(price))?;
            ledger.save(ledger_path)?;
            println!("Updated {symbol}");
        }

        Action::Remove { ticker, portfolio } => {
            let symbol = normalize_ticker(&ticker, suffix);
            ledger.remove_holding(portfolio, &symbol)?;
            ledger.save(ledger_path)?;
            println!("Removed {symbol}");
        }

        Action::Summary => {
            let source = open_source(&config)?;
            let mut prices = HashMap::new();
            for symbol in ledger.tickers() {
                match source.price_history(&symbol, 1) {
                    Ok(Some(series)) => {
                        if let Some(bar) = series.last() {
                            prices.insert(symbol, bar.close);
                        }
                    }
                    Ok(None) => warn!("{}: no price, valuing at cost", symbol),
                    Err(e) => warn!("{}: price fetch failed, valuing at cost: {:#}", symbol, e),
                }
            }
            info!("Priced {} of {} holdings", prices.len(), ledger.tickers().len());

            for valuation in ledger.valuate_all(&prices) {
                println!("\n{}", "=".repeat(80));
                println!(
                    "[{}] {}  invested {}  value {}  P&L {} ({:+.2}%)",
                    valuation.id,
                    valuation.name,
                    valuation.invested.round_dp(2),
                    valuation.current_value.round_dp(2),
                    valuation.pnl.round_dp(2),
                    valuation.pnl_pct
                );
                println!("{}", "-".repeat(80));
                for h in &valuation.holdings {
                    println!(
                        "  {:<16} {:>8} {:>10} {:>10} {:>12} {:>+8.2}%",
                        h.ticker.as_str(),
                        h.quantity.to_string(),
                        h.avg_price.round_dp(2).to_string(),
                        h.current_price.round_dp(2).to_string(),
                        h.pnl.round_dp(2).to_string(),
                        h.pnl_pct
                    );
                }
            }

            if let Some(db) = &config.data.cache_db {
                let breadth = SqliteCache::open(db)?.breadth(&ledger.tickers())?;
                println!("\n{}", "=".repeat(80));
                println!(
                    "Trend breadth: {} analysed  {} bullish  {} bearish  {} neutral",
                    breadth.total, breadth.bullish, breadth.bearish, breadth.neutral
                );
            }
        }
    }

    Ok(())
}

fn print_holdings(ledger: &Ledger) {
    for portfolio in ledger.portfolios() {
        println!("\n[{}] {} ({} holdings)", portfolio.id, portfolio.name, portfolio.holdings.len());
        for h in &portfolio.holdings {
            println!(
                "  {:<16} {:>8} @ {:>10}  since {}",
                h.ticker.as_str(),
                h.quantity.to_string(),
                h.avg_price.round_dp(2).to_string(),
                h.purchase_date
            );
        }
    }
}
