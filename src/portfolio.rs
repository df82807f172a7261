//! Holdings ledger
//!
//! Named portfolios of holdings carried at weighted-average cost. The ledger
//! is a plain JSON document; every mutation goes through [`Ledger`] so the
//! invariants (positive quantity and price, unique portfolio names) hold on
//! disk as well as in memory.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::{Money, Symbol};

pub const DEFAULT_PORTFOLIO: &str = "Main";

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("portfolio {0} does not exist")]
    UnknownPortfolio(u32),

    #[error("{ticker} is not held in portfolio {portfolio}")]
    UnknownHolding { portfolio: u32, ticker: String },

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    #[error("price must be positive, got {0}")]
    InvalidPrice(Money),

    #[error("a portfolio named {0:?} already exists")]
    DuplicatePortfolio(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: Symbol,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub avg_price: Money,
    /// Date of the first buy; later buys keep it
    pub purchase_date: NaiveDate,
}

impl Holding {
    pub fn invested(&self) -> Money {
        Money::new(self.quantity) * self.avg_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Buy,
}

/// Append-only buy log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub portfolio_id: u32,
    pub ticker: Symbol,
    pub kind: TransactionKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub price: Money,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: u32,
    pub name: String,
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    pub fn holding(&self, ticker: &Symbol) -> Option<&Holding> {
        self.holdings.iter().find(|h| &h.ticker == ticker)
    }

    fn holding_mut(&mut self, ticker: &Symbol) -> Option<&mut Holding> {
        self.holdings.iter_mut().find(|h| &h.ticker == ticker)
    }

    /// Value every holding at `prices`, falling back to average cost
    pub fn valuate(&self, prices: &HashMap<Symbol, f64>) -> PortfolioValuation {
        let holdings: Vec<HoldingValuation> = self
            .holdings
            .iter()
            .map(|h| {
                let current_price = prices
                    .get(&h.ticker)
                    .map(|p| Money::from_f64(*p))
                    .unwrap_or(h.avg_price);
                let invested = h.invested();
                let current_value = Money::new(h.quantity) * current_price;
                let pnl = current_value - invested;
                HoldingValuation {
                    ticker: h.ticker.clone(),
                    quantity: h.quantity,
                    avg_price: h.avg_price,
                    current_price,
                    invested,
                    current_value,
                    pnl,
                    pnl_pct: pct(pnl, invested),
                }
            })
            .collect();

        let invested: Money = holdings.iter().map(|h| h.invested).sum();
        let current_value: Money = holdings.iter().map(|h| h.current_value).sum();
        let pnl = current_value - invested;

        PortfolioValuation {
            id: self.id,
            name: self.name.clone(),
            invested,
            current_value,
            pnl,
            pnl_pct: pct(pnl, invested),
            holdings,
        }
    }
}

fn pct(pnl: Money, invested: Money) -> f64 {
    if invested.is_zero() {
        0.0
    } else {
        ((pnl / invested).inner() * dec!(100))
            .round_dp(2)
            .to_f64()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingValuation {
    pub ticker: Symbol,
    pub quantity: Decimal,
    pub avg_price: Money,
    pub current_price: Money,
    pub invested: Money,
    pub current_value: Money,
    pub pnl: Money,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioValuation {
    pub id: u32,
    pub name: String,
    pub invested: Money,
    pub current_value: Money,
    pub pnl: Money,
    pub pnl_pct: f64,
    pub holdings: Vec<HoldingValuation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    portfolios: Vec<Portfolio>,
    #[serde(default)]
    transactions: Vec<Transaction>,
    next_id: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            portfolios: vec![Portfolio {
                id: 1,
                name: DEFAULT_PORTFOLIO.to_string(),
                holdings: Vec::new(),
            }],
            transactions: Vec::new(),
            next_id: 2,
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger, starting a fresh one when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse ledger {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write ledger {}", path.display()))?;
        info!("Ledger saved to {}", path.display());
        Ok(())
    }

    pub fn portfolios(&self) -> &[Portfolio] {
        &self.portfolios
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn portfolio(&self, id: u32) -> Result<&Portfolio, LedgerError> {
        self.portfolios
            .iter()
            .find(|p| p.id == id)
            .ok_or(LedgerError::UnknownPortfolio(id))
    }

    fn portfolio_mut(&mut self, id: u32) -> Result<&mut Portfolio, LedgerError> {
        self.portfolios
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(LedgerError::UnknownPortfolio(id))
    }

    pub fn create_portfolio(&mut self, name: &str) -> Result<u32, LedgerError> {
        let name = name.trim();
        if self.portfolios.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
            return Err(LedgerError::DuplicatePortfolio(name.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.portfolios.push(Portfolio {
            id,
            name: name.to_string(),
            holdings: Vec::new(),
        });
        info!(id, name, "Portfolio created");
        Ok(id)
    }

    pub fn rename_portfolio(&mut self, id: u32, name: &str) -> Result<(), LedgerError> {
        let name = name.trim();
        if self
            .portfolios
            .iter()
            .any(|p| p.id != id && p.name.eq_ignore_ascii_case(name))
        {
            return Err(LedgerError::DuplicatePortfolio(name.to_string()));
        }
        self.portfolio_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// Buy into a holding, averaging cost with any existing position
    pub fn add_holding(
        &mut self,
        portfolio_id: u32,
        ticker: Symbol,
        quantity: Decimal,
        price: Money,
        date: NaiveDate,
    ) -> Result<&Holding, LedgerError> {
        validate(quantity, price)?;
        self.portfolio(portfolio_id)?;

        self.transactions.push(Transaction {
            portfolio_id,
            ticker: ticker.clone(),
            kind: TransactionKind::Buy,
            quantity,
            price,
            date,
        });

        let portfolio = self.portfolio_mut(portfolio_id)?;

        let index = match portfolio.holdings.iter().position(|h| h.ticker == ticker) {
            Some(index) => {
                let holding = &mut portfolio.holdings[index];
                let total_qty = holding.quantity + quantity;
                let total_cost = holding.invested() + Money::new(quantity) * price;
                holding.avg_price = total_cost / Money::new(total_qty);
                holding.quantity = total_qty;
                debug!(%ticker, qty = %total_qty, avg = %holding.avg_price, "Holding averaged");
                index
            }
            None => {
                portfolio.holdings.push(Holding {
                    ticker: ticker.clone(),
                    quantity,
                    avg_price: price,
                    purchase_date: date,
                });
                portfolio.holdings.len() - 1
            }
        };
        Ok(&portfolio.holdings[index])
    }

    /// Overwrite quantity and average price; a zero quantity removes the holding
    pub fn update_holding(
        &mut self,
        portfolio_id: u32,
        ticker: &Symbol,
        quantity: Decimal,
        price: Money,
    ) -> Result<(), LedgerError> {
        if quantity.is_zero() {
            return self.remove_holding(portfolio_id, ticker).map(|_| ());
        }
        validate(quantity, price)?;
        let holding = self
            .portfolio_mut(portfolio_id)?
            .holding_mut(ticker)
            .ok_or_else(|| LedgerError::UnknownHolding {
                portfolio: portfolio_id,
                ticker: ticker.to_string(),
            })?;
        holding.quantity = quantity;
        holding.avg_price = price;
        Ok(())
    }

    pub fn set_purchase_date(
        &mut self,
        portfolio_id: u32,
        ticker: &Symbol,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        let holding = self
            .portfolio_mut(portfolio_id)?
            .holding_mut(ticker)
            .ok_or_else(|| LedgerError::UnknownHolding {
                portfolio: portfolio_id,
                ticker: ticker.to_string(),
            })?;
        holding.purchase_date = date;
        Ok(())
    }

    pub fn remove_holding(&mut self, portfolio_id: u32, ticker: &Symbol) -> Result<Holding, LedgerError> {
        let portfolio = self.portfolio_mut(portfolio_id)?;
        let index = portfolio
            .holdings
            .iter()
            .position(|h| &h.ticker == ticker)
            .ok_or_else(|| LedgerError::UnknownHolding {
                portfolio: portfolio_id,
                ticker: ticker.to_string(),
            })?;
        Ok(portfolio.holdings.remove(index))
    }

    /// Every ticker held in any portfolio, deduplicated
    pub fn tickers(&self) -> Vec<Symbol> {
        let mut tickers: Vec<Symbol> = self
            .portfolios
            .iter()
            .flat_map(|p| p.holdings.iter().map(|h| h.ticker.clone()))
            .collect();
        tickers.sort();
        tickers.dedup();
        tickers
    }

    pub fn valuate_all(&self, prices: &HashMap<Symbol, f64>) -> Vec<PortfolioValuation> {
        self.portfolios.iter().map(|p| p.valuate(prices)).collect()
    }
}

fn validate(quantity: Decimal, price: Money) -> Result<(), LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    if !price.is_positive() {
        return Err(LedgerError::InvalidPrice(price));
    }
    Ok(())
}
