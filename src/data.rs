//! Data loading and management
//!
//! Price history comes from a [`PriceSource`]: CSV files on disk or daily bars
//! over HTTP. Either can be wrapped by the SQLite cache in [`crate::cache`].

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::sleep;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, info, warn};

use crate::config::{DataConfig, DataSourceKind};
use crate::{PriceBar, PriceSeries, Symbol};

// =============================================================================
// Source Contract
// =============================================================================

/// Daily price history provider
///
/// `Ok(None)` means the source has nothing for the ticker. Bars are returned
/// ascending by date.
pub trait PriceSource: Send + Sync {
    /// Full history, at least `min_bars` long when the source has that much
    fn price_history(&self, symbol: &Symbol, min_bars: usize) -> Result<Option<PriceSeries>>;

    /// Bars dated strictly after `since`
    fn history_since(&self, symbol: &Symbol, since: NaiveDate) -> Result<Option<PriceSeries>> {
        Ok(self.price_history(symbol, 0)?.and_then(|series| {
            let newer: Vec<PriceBar> = series
                .bars()
                .iter()
                .filter(|b| b.date > since)
                .cloned()
                .collect();
            if newer.is_empty() {
                None
            } else {
                Some(PriceSeries::from_unsorted(newer))
            }
        }))
    }
}

/// Build the configured source, wrapped in the price cache when one is set
pub fn build_source(config: &DataConfig) -> Result<Box<dyn PriceSource>> {
    let upstream: Box<dyn PriceSource> = match config.source {
        DataSourceKind::Csv => Box::new(CsvDirectorySource::new(&config.data_dir)),
        DataSourceKind::Http => Box::new(HttpHistorySource::new(config)?),
    };

    match &config.cache_db {
        Some(path) => {
            let cache = crate::cache::SqliteCache::open(path)?;
            Ok(Box::new(crate::cache::CachedSource::new(cache, upstream)))
        }
        None => Ok(upstream),
    }
}

/// Normalise a user-supplied ticker
///
/// Trims and upper-cases, then appends `suffix` unless the ticker already
/// names an exchange (`.NS`, `.BO`) or is an index (`^` prefix).
pub fn normalize_ticker(raw: &str, suffix: &str) -> Symbol {
    let ticker = raw.trim().to_uppercase();
    let qualified = ticker.ends_with(".NS") || ticker.ends_with(".BO") || ticker.starts_with('^');
    if qualified || suffix.is_empty() || ticker.is_empty() {
        Symbol::new(ticker)
    } else {
        Symbol::new(format!("{ticker}{}", suffix.to_uppercase()))
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load daily bars from CSV (date,open,high,low,close,volume with header)
///
/// Rows may be in any order; duplicates keep the last row for a date.
pub fn load_csv(path: impl AsRef<Path>) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;

    let mut bars = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let date_str = record.get(0).context("Missing date column")?;
        let date = parse_date(date_str)?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {name} column"))?
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Failed to parse {name} on row {}", row_idx + 1))
        };

        let bar = PriceBar::new(
            date,
            field(1, "open")?,
            field(2, "high")?,
            field(3, "low")?,
            field(4, "close")?,
            field(5, "volume")?,
        );
        if let Err(e) = bar.validate() {
            warn!("Skipping invalid bar in {}: {}", path.as_ref().display(), e);
            continue;
        }
        bars.push(bar);
    }

    Ok(PriceSeries::from_unsorted(bars))
}

/// Accepts `YYYY-MM-DD` optionally followed by a time component
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse date: {s}"))
}

/// Write bars to CSV in the format [`load_csv`] reads
pub fn save_csv(series: &PriceSeries, path: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    writer.write_record(["date", "open", "high", "low", "close", "volume"])?;
    for bar in series.bars() {
        writer.write_record(&[
            bar.date.format("%Y-%m-%d").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads `<dir>/<TICKER>.csv`
pub struct CsvDirectorySource {
    data_dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol.as_str()))
    }
}

impl PriceSource for CsvDirectorySource {
    fn price_history(&self, symbol: &Symbol, _min_bars: usize) -> Result<Option<PriceSeries>> {
        let path = self.path_for(symbol);
        if !path.exists() {
            debug!("Data file not found: {}", path.display());
            return Ok(None);
        }
        let series = load_csv(&path).with_context(|| format!("Failed to load data for {symbol}"))?;
        debug!("Loaded {} bars for {}", series.len(), symbol);
        Ok(if series.is_empty() { None } else { Some(series) })
    }
}

// =============================================================================
// HTTP History Fetcher
// =============================================================================

#[derive(Debug, serde::Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, serde::Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, serde::Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Fetches daily bars from a chart-style JSON endpoint
///
/// Requests are spaced by `request_delay` across all worker threads.
pub struct HttpHistorySource {
    client: reqwest::blocking::Client,
    base_url: String,
    history_days: i64,
    request_delay: StdDuration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpHistorySource {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (trend-screener)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            history_days: config.history_days,
            request_delay: StdDuration::from_millis(config.request_delay_ms),
            last_request: Mutex::new(None),
        })
    }

    fn throttle(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.request_delay {
                sleep(self.request_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn fetch_range(&self, symbol: &Symbol, start: NaiveDate) -> Result<Option<PriceSeries>> {
        self.throttle();

        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let period2 = Utc::now().timestamp();
        let url = format!("{}/{}", self.base_url, symbol.as_str());

        debug!(%symbol, %start, "Fetching daily history");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .with_context(|| format!("Failed to fetch history for {symbol}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ChartResponse = response
            .error_for_status()
            .with_context(|| format!("History request rejected for {symbol}"))?
            .json()
            .with_context(|| format!("Failed to parse history for {symbol}"))?;

        if let Some(err) = body.chart.error.filter(|e| !e.is_null()) {
            warn!(%symbol, "History endpoint returned error: {}", err);
            return Ok(None);
        }

        let Some(result) = body.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(None);
        };
        let series = bars_from_chart(result);
        info!("Fetched {} bars for {}", series.len(), symbol);
        Ok(if series.is_empty() { None } else { Some(series) })
    }
}

fn bars_from_chart(result: ChartResult) -> PriceSeries {
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let bars = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = chrono::DateTime::from_timestamp(ts, 0)?.date_naive();
            let close = (*quote.close.get(i)?)?;
            let open = quote.open.get(i).copied().flatten().unwrap_or(close);
            let high = quote.high.get(i).copied().flatten().unwrap_or(close);
            let low = quote.low.get(i).copied().flatten().unwrap_or(close);
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);
            let bar = PriceBar::new(date, open, high, low, close, volume);
            bar.validate().ok().map(|_| bar)
        })
        .collect();

    PriceSeries::from_unsorted(bars)
}

impl PriceSource for HttpHistorySource {
    fn price_history(&self, symbol: &Symbol, min_bars: usize) -> Result<Option<PriceSeries>> {
        // About 5 trading days per 7 calendar days, plus slack for holidays
        let needed_days = (min_bars as i64 * 7) / 5 + 30;
        let days = self.history_days.max(needed_days);
        let start = Utc::now().date_naive() - Duration::days(days);
        self.fetch_range(symbol, start)
    }

    fn history_since(&self, symbol: &Symbol, since: NaiveDate) -> Result<Option<PriceSeries>> {
        let fetched = self.fetch_range(symbol, since + Duration::days(1))?;
        Ok(fetched.and_then(|series| {
            let newer: Vec<PriceBar> = series
                .bars()
                .iter()
                .filter(|b| b.date > since)
                .cloned()
                .collect();
            if newer.is_empty() {
                None
            } else {
                Some(PriceSeries::from_unsorted(newer))
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" reliance ", ".NS").as_str(), "RELIANCE.NS");
        assert_eq!(normalize_ticker("tcs.bo", ".NS").as_str(), "TCS.BO");
        assert_eq!(normalize_ticker("^nsei", ".NS").as_str(), "^NSEI");
        assert_eq!(normalize_ticker("AAPL", "").as_str(), "AAPL");
    }

    #[test]
    fn test_csv_roundtrip_through_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let series = PriceSeries::new(
            (0..5)
                .map(|i| PriceBar::new(start + Duration::days(i), 10.0, 11.0, 9.0, 10.5, 100.0))
                .collect(),
        )
        .unwrap();
        save_csv(&series, dir.path().join("ABC.NS.csv")).unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let loaded = source
            .price_history(&Symbol::new("ABC.NS"), 0)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, series);
        assert!(source.price_history(&Symbol::new("MISSING"), 0).unwrap().is_none());
    }

    #[test]
    fn test_history_since_filters_older_bars() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let series = PriceSeries::new(
            (0..5)
                .map(|i| PriceBar::from_close(start + Duration::days(i), 10.0 + i as f64))
                .collect(),
        )
        .unwrap();
        save_csv(&series, dir.path().join("XYZ.csv")).unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let newer = source
            .history_since(&Symbol::new("XYZ"), start + Duration::days(2))
            .unwrap()
            .unwrap();
        assert_eq!(newer.closes(), vec![13.0, 14.0]);
    }

    #[test]
    fn test_bars_from_chart_skips_missing_closes() {
        let json = r#"{
            "timestamp": [1704067200, 1704153600, 1704240000],
            "indicators": { "quote": [{
                "open": [10.0, null, 12.0],
                "high": [11.0, null, 13.0],
                "low": [9.0, null, 11.0],
                "close": [10.5, null, 12.5],
                "volume": [100, null, 300]
            }]}
        }"#;
        let result: ChartResult = serde_json::from_str(json).unwrap();
        let series = bars_from_chart(result);
        assert_eq!(series.closes(), vec![10.5, 12.5]);
    }
}
