//! Technical indicator implementations.
//!
//! This module provides types for representing indicator series:
//! - `IndicatorPoint`: A single defined point in an indicator time series
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series aligned to its price series, minus the
//!   undefined warm-up prefix
//!
//! Every calculation is a single O(n) pass with rolling accumulation.

pub mod channel;
pub mod rsi;
pub mod sma;

use chrono::NaiveDate;
use std::fmt;

use crate::domain::error::BacktestError;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    RollingHigh(usize),
    RollingLow(usize),
}

/// Indicator output aligned to the source series.
///
/// `values[k]` belongs to bar `offset + k`; bars before `offset` have no
/// value yet.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub offset: usize,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at a bar index of the source series, `None` inside the warm-up
    /// prefix or past the end.
    pub fn value_at(&self, bar_index: usize) -> Option<f64> {
        bar_index
            .checked_sub(self.offset)
            .and_then(|k| self.values.get(k))
            .map(|p| p.value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::RollingHigh(period) => write!(f, "HIGH({})", period),
            IndicatorType::RollingLow(period) => write!(f, "LOW({})", period),
        }
    }
}

/// Rejects windows outside `1..=max`.
pub(crate) fn check_window(
    indicator: IndicatorType,
    window: usize,
    max: usize,
) -> Result<(), BacktestError> {
    if window == 0 || window > max {
        return Err(BacktestError::ConfigInvalid {
            section: "indicator".into(),
            key: indicator.to_string(),
            reason: format!("window must be between 1 and {max}, got {window}"),
        });
    }
    Ok(())
}
