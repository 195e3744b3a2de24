//! CSV file data adapter.
//!
//! One file per ticker, `<base_path>/<TICKER>.csv`, with the header
//! `date,open,high,low,close,volume` and ISO dates. Rows are returned in
//! file order; an unordered file fails later when the series is built.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{DateRange, OhlcvBar};
use crate::ports::data_port::DataPort;

const EXTENSION: &str = "csv";

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvRow> for OhlcvBar {
    fn from(row: CsvRow) -> Self {
        OhlcvBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, ticker: &str) -> Result<PathBuf, BacktestError> {
        if ticker.is_empty() || ticker.contains(['/', '\\']) || ticker.contains("..") {
            return Err(source_error(ticker, "ticker is not a plain symbol"));
        }
        Ok(self.base_path.join(format!("{ticker}.{EXTENSION}")))
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<OhlcvBar>, BacktestError> {
        let path = self.csv_path(ticker)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| source_error(ticker, format!("failed to open {}: {e}", path.display())))?;

        let mut bars = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| {
                source_error(ticker, format!("{} row {}: {e}", path.display(), line + 1))
            })?;
            bars.push(OhlcvBar::from(row));
        }

        debug!(ticker, bars = bars.len(), path = %path.display(), "loaded csv");
        Ok(bars)
    }
}

fn source_error(ticker: &str, reason: impl Into<String>) -> BacktestError {
    BacktestError::DataSource {
        ticker: ticker.to_string(),
        reason: reason.into(),
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<OhlcvBar>, BacktestError> {
        let mut bars = self.read_all(ticker)?;
        if let Some(range) = range {
            bars.retain(|b| range.contains(b.date));
        }
        Ok(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            source_error(
                "*",
                format!("failed to read directory {}: {e}", self.base_path.display()),
            )
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| source_error("*", format!("directory entry error: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tickers.push(stem.to_string());
            }
        }

        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        if !self.csv_path(ticker)?.exists() {
            return Ok(None);
        }
        let bars = self.read_all(ticker)?;
        let first = bars.iter().map(|b| b.date).min();
        let last = bars.iter().map(|b| b.date).max();
        Ok(first.zip(last).map(|(first, last)| (first, last, bars.len())))
    }
}
