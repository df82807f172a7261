//! SQLite price cache
//!
//! Stores daily bars per ticker so repeated runs only fetch the bars newer
//! than what is already on disk. The latest analysis summary per ticker is
//! kept alongside, last write wins.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::data::PriceSource;
use crate::error::ScreenError;
use crate::orchestrator::{AnalysisReport, MarketBreadth, ReportSummary};
use crate::{PriceBar, PriceSeries, Symbol};

#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

/// Stored outcome of the most recent analysis of one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub ticker: Symbol,
    pub price: Option<f64>,
    pub summary: ReportSummary,
    pub analyzed_at: DateTime<Utc>,
}

impl SqliteCache {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open price cache: {}", db_path.display()))?;

        // WAL lets readers proceed while a worker writes fresh bars
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let cache = Self::from_connection(conn)?;
        info!("Price cache opened at {}", db_path.display());
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.create_tables()?;
        Ok(cache)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("price cache lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bars (
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (ticker, date)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS analysis (
                ticker TEXT PRIMARY KEY,
                price REAL,
                count_passed INTEGER NOT NULL,
                count_total INTEGER NOT NULL,
                overall_bullish INTEGER NOT NULL,
                overall_bearish INTEGER NOT NULL,
                analyzed_at TEXT NOT NULL
            )",
            [],
        )?;
        debug!("Price cache schema created/verified");
        Ok(())
    }

    /// All cached bars for a ticker, oldest first
    pub fn load(&self, symbol: &Symbol) -> Result<Option<PriceSeries>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, open, high, low, close, volume FROM bars
             WHERE ticker = ?1 ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(params![symbol.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;

        let mut bars = Vec::new();
        for row in rows {
            let (date, open, high, low, close, volume) = row?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Corrupt cached date for {symbol}: {date}"))?;
            bars.push(PriceBar::new(date, open, high, low, close, volume));
        }

        if bars.is_empty() {
            return Ok(None);
        }
        let series = PriceSeries::new(bars).map_err(ScreenError::from)?;
        Ok(Some(series))
    }

    /// Insert or replace bars for a ticker
    pub fn store(&self, symbol: &Symbol, bars: &[PriceBar]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO bars (ticker, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for bar in bars {
                stmt.execute(params![
                    symbol.as_str(),
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Cached {} bars for {}", bars.len(), symbol);
        Ok(bars.len())
    }

    pub fn last_date(&self, symbol: &Symbol) -> Result<Option<NaiveDate>> {
        let conn = self.lock()?;
        let last: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM bars WHERE ticker = ?1",
            params![symbol.as_str()],
            |row| row.get(0),
        )?;
        last.map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .with_context(|| format!("Corrupt cached date for {symbol}: {d}"))
        })
        .transpose()
    }

    pub fn clear(&self, symbol: &Symbol) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM bars WHERE ticker = ?1", params![symbol.as_str()])?;
        Ok(())
    }

    /// Replace the stored analysis for the report's ticker
    pub fn store_analysis(&self, report: &AnalysisReport) -> Result<()> {
        let conn = self.lock()?;
        let summary = &report.summary;
        conn.execute(
            "INSERT OR REPLACE INTO analysis
                (ticker, price, count_passed, count_total, overall_bullish, overall_bearish, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.ticker.as_str(),
                report.price,
                summary.count_passed as i64,
                summary.count_total as i64,
                summary.overall_bullish,
                summary.overall_bearish,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Cached analysis for {}", report.ticker);
        Ok(())
    }

    pub fn load_analysis(&self, symbol: &Symbol) -> Result<Option<AnalysisRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT price, count_passed, count_total, overall_bullish, overall_bearish, analyzed_at
             FROM analysis WHERE ticker = ?1",
        )?;
        let mut rows = stmt.query(params![symbol.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let analyzed_at: String = row.get(5)?;
        let analyzed_at = DateTime::parse_from_rfc3339(&analyzed_at)
            .with_context(|| format!("Corrupt analysis timestamp for {symbol}: {analyzed_at}"))?
            .with_timezone(&Utc);
        Ok(Some(AnalysisRecord {
            ticker: symbol.clone(),
            price: row.get(0)?,
            summary: ReportSummary {
                count_passed: row.get::<_, i64>(1)?.max(0) as usize,
                count_total: row.get::<_, i64>(2)?.max(0) as usize,
                overall_bullish: row.get(3)?,
                overall_bearish: row.get(4)?,
            },
            analyzed_at,
        }))
    }

    /// Breadth over the stored analyses of `tickers`
    ///
    /// Tickers never analysed are left out of the total.
    pub fn breadth(&self, tickers: &[Symbol]) -> Result<MarketBreadth> {
        let mut records = Vec::with_capacity(tickers.len());
        for symbol in tickers {
            if let Some(record) = self.load_analysis(symbol)? {
                records.push(record);
            }
        }
        Ok(MarketBreadth::tally(records.iter().map(|r| &r.summary)))
    }
}

/// Read-through cache in front of another source
///
/// A cold ticker is fetched in full; a warm one only asks upstream for bars
/// after its last cached date. When upstream fails the cached bars are served.
pub struct CachedSource<S: PriceSource + ?Sized> {
    cache: SqliteCache,
    upstream: Box<S>,
}

impl<S: PriceSource + ?Sized> CachedSource<S> {
    pub fn new(cache: SqliteCache, upstream: Box<S>) -> Self {
        Self { cache, upstream }
    }

    pub fn cache(&self) -> &SqliteCache {
        &self.cache
    }

    fn full_fetch(&self, symbol: &Symbol, min_bars: usize) -> Result<Option<PriceSeries>> {
        let fetched = self.upstream.price_history(symbol, min_bars)?;
        if let Some(series) = &fetched {
            if let Err(e) = self.cache.store(symbol, series.bars()) {
                warn!(%symbol, "Failed to cache fetched bars: {:#}", e);
            }
        }
        Ok(fetched)
    }
}

impl<S: PriceSource + ?Sized> PriceSource for CachedSource<S> {
    fn price_history(&self, symbol: &Symbol, min_bars: usize) -> Result<Option<PriceSeries>> {
        let cached = match self.cache.load(symbol)? {
            Some(series) if series.len() >= min_bars => series,
            Some(series) => {
                debug!(%symbol, cached = series.len(), min_bars, "Cached history too short, refetching");
                return match self.full_fetch(symbol, min_bars) {
                    Ok(Some(fresh)) => Ok(Some(fresh)),
                    Ok(None) => Ok(Some(series)),
                    Err(e) => {
                        warn!(%symbol, "Upstream fetch failed, serving cached bars: {:#}", e);
                        Ok(Some(series))
                    }
                };
            }
            None => return self.full_fetch(symbol, min_bars),
        };

        let Some(last) = cached.last_date() else {
            return Ok(Some(cached));
        };
        if last >= Utc::now().date_naive() {
            return Ok(Some(cached));
        }

        match self.upstream.history_since(symbol, last) {
            Ok(Some(newer)) => {
                match self.cache.store(symbol, newer.bars()) {
                    Ok(added) => debug!(%symbol, added, "Refreshed cached history"),
                    Err(e) => warn!(%symbol, "Failed to cache refreshed bars: {:#}", e),
                }
                Ok(Some(cached.merged(newer.bars())))
            }
            Ok(None) => Ok(Some(cached)),
            Err(e) => {
                warn!(%symbol, "Upstream refresh failed, serving cached bars: {:#}", e);
                Ok(Some(cached))
            }
        }
    }

    fn history_since(&self, symbol: &Symbol, since: NaiveDate) -> Result<Option<PriceSeries>> {
        self.upstream.history_since(symbol, since)
    }
}
