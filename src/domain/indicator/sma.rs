//! Simple Moving Average.
//!
//! SMA(n)[i] = (C[i] + C[i-1] + ... + C[i-n+1]) / n
//! Kept as a rolling sum: add the newest close, drop the one leaving the window.
//! The sum is rebuilt from the window every `n` bars so rounding cannot pile up.
//! Warmup: first (n-1) bars have no value.

use crate::domain::error::BacktestError;
use crate::domain::indicator::{check_window, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceSeries;

pub fn calculate_sma(series: &PriceSeries, period: usize) -> Result<IndicatorSeries, BacktestError> {
    let indicator_type = IndicatorType::Sma(period);
    check_window(indicator_type, period, series.len())?;

    let bars = series.bars();
    let mut values = Vec::with_capacity(bars.len() + 1 - period);
    let mut sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i >= period && (i + 1) % period == 0 {
            sum = bars[i + 1 - period..=i].iter().map(|b| b.close).sum();
        } else {
            sum += bar.close;
            if i >= period {
                sum -= bars[i - period].close;
            }
        }
        if i + 1 >= period {
            values.push(IndicatorPoint {
                date: bar.date,
                value: sum / period as f64,
            });
        }
    }

    Ok(IndicatorSeries {
        indicator_type,
        offset: period - 1,
        values,
    })
}
