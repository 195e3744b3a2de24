//! Batch indicator computation into a per-run cache.

use std::collections::HashMap;

use crate::domain::error::BacktestError;
use crate::domain::indicator::channel::{calculate_rolling_high, calculate_rolling_low};
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceSeries;

pub type IndicatorCache = HashMap<IndicatorType, IndicatorSeries>;

pub fn calculate(
    series: &PriceSeries,
    indicator: IndicatorType,
) -> Result<IndicatorSeries, BacktestError> {
    match indicator {
        IndicatorType::Sma(period) => calculate_sma(series, period),
        IndicatorType::Rsi(period) => calculate_rsi(series, period),
        IndicatorType::RollingHigh(period) => calculate_rolling_high(series, period),
        IndicatorType::RollingLow(period) => calculate_rolling_low(series, period),
    }
}

/// Computes every requested indicator once; duplicates in `types` are skipped.
pub fn compute_indicators(
    series: &PriceSeries,
    types: &[IndicatorType],
) -> Result<IndicatorCache, BacktestError> {
    let mut cache = IndicatorCache::with_capacity(types.len());
    for &indicator in types {
        if cache.contains_key(&indicator) {
            continue;
        }
        cache.insert(indicator, calculate(series, indicator)?);
    }
    Ok(cache)
}
