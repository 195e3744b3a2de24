#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

use barsim::domain::backtest::BacktestConfig;
use barsim::domain::error::BacktestError;
pub use barsim::domain::ohlcv::{DateRange, OhlcvBar, PriceSeries};
use barsim::ports::data_port::DataPort;
use chrono::NaiveDate;

/// In-memory data port that also counts how often it was asked for bars.
pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    fn check(&self, ticker: &str) -> Result<(), BacktestError> {
        match self.errors.get(ticker) {
            Some(reason) => Err(BacktestError::DataSource {
                ticker: ticker.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<OhlcvBar>, BacktestError> {
        self.fetches.set(self.fetches.get() + 1);
        self.check(ticker)?;
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| range.is_none_or(|r| r.contains(b.date)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        self.check(ticker)?;
        match self.data.get(ticker) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

/// One bar per calendar day starting at `start`, high/low equal to close.
pub fn bars_from_closes(start: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

pub fn series_from_closes(closes: &[f64]) -> PriceSeries {
    PriceSeries::new("TEST", bars_from_closes("2024-01-01", closes)).unwrap()
}

/// Linear ramp: close = start_price + i.
pub fn generate_bars(start_date: &str, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + i as f64).collect();
    bars_from_closes(start_date, &closes)
}

/// Constant close for every bar.
pub fn flat_bars(start_date: &str, count: usize, close: f64) -> Vec<OhlcvBar> {
    bars_from_closes(start_date, &vec![close; count])
}

/// Deterministic oscillating series with drift, good for exercising every
/// strategy in both directions.
pub fn wave_closes(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            100.0 + 12.0 * (t / 7.0).sin() + 4.0 * (t / 2.3).cos() + t * 0.05
        })
        .collect()
}

pub fn default_config() -> BacktestConfig {
    BacktestConfig::default()
}

pub fn write_csv(dir: &Path, ticker: &str, bars: &[OhlcvBar]) {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{ticker}.csv")), out).unwrap();
}
