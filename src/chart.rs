//! Chart export
//!
//! Successful analyses are offered to a [`ChartSink`]. Publishing is
//! fire-and-forget from the orchestrator's point of view.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::indicators::IndicatorFrame;
use crate::strategies::Verdict;
use crate::{Status, Symbol};

pub trait ChartSink: Send + Sync {
    fn publish(&self, symbol: &Symbol, frame: &IndicatorFrame, verdicts: &[Verdict]) -> Result<()>;
}

#[derive(Serialize)]
struct ChartDocument<'a> {
    ticker: &'a str,
    generated_at: String,
    frame: &'a IndicatorFrame,
    verdicts: Vec<ChartVerdict<'a>>,
}

#[derive(Serialize)]
struct ChartVerdict<'a> {
    strategy: &'a str,
    status: Status,
    score: String,
    metrics: &'a BTreeMap<String, f64>,
}

/// Writes `<output_dir>/<TICKER>.json`
pub struct JsonChartSink {
    output_dir: PathBuf,
}

impl JsonChartSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &Symbol) -> PathBuf {
        // Index tickers like ^NSEI make awkward file names
        let stem = symbol.as_str().trim_start_matches('^');
        self.output_dir.join(format!("{stem}.json"))
    }
}

impl ChartSink for JsonChartSink {
    fn publish(&self, symbol: &Symbol, frame: &IndicatorFrame, verdicts: &[Verdict]) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create chart directory {}", self.output_dir.display())
        })?;

        let doc = ChartDocument {
            ticker: symbol.as_str(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            frame,
            verdicts: verdicts
                .iter()
                .map(|v| ChartVerdict {
                    strategy: &v.strategy,
                    status: v.status,
                    score: v.score.to_string(),
                    metrics: &v.metrics,
                })
                .collect(),
        };

        let path = self.path_for(symbol);
        let json = serde_json::to_string(&doc)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(%symbol, path = %path.display(), "Chart data written");
        Ok(())
    }
}
