//! OHLCV bars and the validated price series a run walks over.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::BacktestError;

/// Fewest bars a series may hold: one return needs two observations.
pub const MIN_SERIES_BARS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    fn check(&self) -> Result<(), String> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive finite price, got {value}"));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(format!(
                "volume must be finite and non-negative, got {}",
                self.volume
            ));
        }
        if self.high < self.low {
            return Err(format!("high {} is below low {}", self.high, self.low));
        }
        Ok(())
    }
}

/// Inclusive calendar window used to narrow a price fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BacktestError> {
        let range = DateRange { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Deserialized ranges skip [`DateRange::new`], so the boundary re-checks.
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.start > self.end {
            return Err(BacktestError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Immutable, strictly date-ordered bars for a single ticker.
///
/// The only way to build one is [`PriceSeries::new`], so every series the
/// engine sees has already passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<OhlcvBar>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, bars: Vec<OhlcvBar>) -> Result<Self, BacktestError> {
        let ticker = ticker.into();

        if bars.is_empty() {
            return Err(BacktestError::EmptySeries { ticker });
        }
        if bars.len() < MIN_SERIES_BARS {
            return Err(BacktestError::InsufficientBars {
                ticker,
                bars: bars.len(),
                minimum: MIN_SERIES_BARS,
            });
        }

        for (index, bar) in bars.iter().enumerate() {
            if let Err(reason) = bar.check() {
                return Err(BacktestError::MalformedSeries {
                    ticker,
                    index,
                    reason,
                });
            }
            if index > 0 && bar.date <= bars[index - 1].date {
                return Err(BacktestError::MalformedSeries {
                    ticker,
                    index,
                    reason: format!(
                        "date {} does not follow {}",
                        bar.date,
                        bars[index - 1].date
                    ),
                });
            }
        }

        Ok(Self { ticker, bars })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> Option<&OhlcvBar> {
        self.bars.get(index)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; kept for slice-like ergonomics.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bars.iter().map(|b| b.close)
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;

    fn bar_on(day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn series_accepts_ordered_bars() {
        let series = PriceSeries::new("SPY", vec![bar_on(1, 10.0), bar_on(2, 11.0)]).unwrap();
        assert_eq!(series.ticker(), "SPY");
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(series.last_date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(series.closes().collect::<Vec<_>>(), vec![10.0, 11.0]);
    }

    #[test]
    fn series_rejects_empty() {
        let err = PriceSeries::new("SPY", vec![]).unwrap_err();
        assert!(matches!(err, BacktestError::EmptySeries { .. }));
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn series_rejects_single_bar() {
        let err = PriceSeries::new("SPY", vec![bar_on(1, 10.0)]).unwrap_err();
        assert!(matches!(
            err,
            BacktestError::InsufficientBars { bars: 1, minimum: 2, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let err = PriceSeries::new("SPY", vec![bar_on(1, 10.0), bar_on(1, 11.0)]).unwrap_err();
        assert!(matches!(err, BacktestError::MalformedSeries { index: 1, .. }));
    }

    #[test]
    fn series_rejects_out_of_order_dates() {
        let err = PriceSeries::new(
            "SPY",
            vec![bar_on(3, 10.0), bar_on(2, 11.0), bar_on(4, 12.0)],
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::MalformedSeries { index: 1, .. }));
    }

    #[test]
    fn series_rejects_non_positive_price() {
        let mut bad = bar_on(2, 11.0);
        bad.close = 0.0;
        let err = PriceSeries::new("SPY", vec![bar_on(1, 10.0), bad]).unwrap_err();
        match err {
            BacktestError::MalformedSeries { index, reason, .. } => {
                assert_eq!(index, 1);
                assert!(reason.contains("close"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn series_rejects_nan_and_negative_volume() {
        let mut nan = bar_on(2, 11.0);
        nan.open = f64::NAN;
        assert!(PriceSeries::new("SPY", vec![bar_on(1, 10.0), nan]).is_err());

        let mut neg = bar_on(2, 11.0);
        neg.volume = -1.0;
        assert!(PriceSeries::new("SPY", vec![bar_on(1, 10.0), neg]).is_err());
    }

    #[test]
    fn series_rejects_inverted_range() {
        let mut bad = bar_on(2, 11.0);
        bad.high = 9.0;
        bad.low = 12.0;
        assert!(PriceSeries::new("SPY", vec![bar_on(1, 10.0), bad]).is_err());
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let range = DateRange::new(jan, feb).unwrap();
        assert!(range.contains(jan));
        assert!(range.contains(feb));
        assert!(!range.contains(feb + chrono::Duration::days(1)));

        let err = DateRange::new(feb, jan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
