//! Rolling high / rolling low (price channel) indicators.
//!
//! HIGH(n)[i] = max(H[i-n+1..=i]), LOW(n)[i] = min(L[i-n+1..=i])
//! Each uses a monotonic deque of bar indices, so every bar is pushed and
//! popped at most once.
//! Warmup: first (n-1) bars have no value.

use std::collections::VecDeque;

use crate::domain::error::BacktestError;
use crate::domain::indicator::{check_window, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::{OhlcvBar, PriceSeries};

pub fn calculate_rolling_high(
    series: &PriceSeries,
    period: usize,
) -> Result<IndicatorSeries, BacktestError> {
    rolling_extreme(series, IndicatorType::RollingHigh(period), period, |b| b.high, |a, b| a >= b)
}

pub fn calculate_rolling_low(
    series: &PriceSeries,
    period: usize,
) -> Result<IndicatorSeries, BacktestError> {
    rolling_extreme(series, IndicatorType::RollingLow(period), period, |b| b.low, |a, b| a <= b)
}

/// `dominates(a, b)` is true when `a` makes `b` irrelevant for every later window.
fn rolling_extreme(
    series: &PriceSeries,
    indicator_type: IndicatorType,
    period: usize,
    field: fn(&OhlcvBar) -> f64,
    dominates: fn(f64, f64) -> bool,
) -> Result<IndicatorSeries, BacktestError> {
    check_window(indicator_type, period, series.len())?;

    let bars = series.bars();
    let mut window: VecDeque<usize> = VecDeque::with_capacity(period);
    let mut values = Vec::with_capacity(bars.len() + 1 - period);

    for (i, bar) in bars.iter().enumerate() {
        let current = field(bar);
        while let Some(&back) = window.back() {
            if dominates(current, field(&bars[back])) {
                window.pop_back();
            } else {
                break;
            }
        }
        window.push_back(i);

        if let Some(&front) = window.front() {
            if front + period <= i {
                window.pop_front();
            }
        }

        if i + 1 >= period {
            if let Some(&best) = window.front() {
                values.push(IndicatorPoint {
                    date: bar.date,
                    value: field(&bars[best]),
                });
            }
        }
    }

    Ok(IndicatorSeries {
        indicator_type,
        offset: period - 1,
        values,
    })
}
