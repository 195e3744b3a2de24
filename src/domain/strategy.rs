//! Strategy catalog and signal generation.
//!
//! A strategy is a closed set of tagged variants, each owning its parameters.
//! Indicators are computed once when a strategy is attached to a series and
//! then read by [`Strategy::signal_at`], which only ever looks at bars at or
//! before the index it is asked about.
//!
//! Crossing rules: a cross is a move to a strict side of the reference from
//! the strict opposite side, or from the warm-up period where the reference
//! was not yet defined. Touching the reference is not a cross.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::BacktestError;
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_helpers::{compute_indicators, IndicatorCache};
use crate::domain::ohlcv::PriceSeries;

/// Named numeric strategy parameters, ordered for deterministic output.
pub type StrategyParams = BTreeMap<String, f64>;

pub const STRATEGY_NAMES: [&str; 3] = ["dual_ma", "rsi", "breakout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    EnterLong,
    ExitLong,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    DualMaCrossover {
        fast: usize,
        slow: usize,
    },
    RsiMeanReversion {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
    MomentumBreakout {
        lookback: usize,
    },
}

impl Strategy {
    /// Builds a strategy from its catalog name and optional parameter overrides.
    ///
    /// Unknown names, unknown parameter keys and out-of-range values are all
    /// rejected before any data is touched.
    pub fn from_name(name: &str, params: &StrategyParams) -> Result<Self, BacktestError> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        let strategy = match normalized.as_str() {
            "dual_ma" => {
                check_keys(params, &["fast", "slow"])?;
                let fast = window_param(params, "fast", 10)?;
                let slow = window_param(params, "slow", 30)?;
                if fast >= slow {
                    return Err(BacktestError::invalid_param(
                        "fast",
                        format!("fast window ({fast}) must be shorter than slow window ({slow})"),
                    ));
                }
                Strategy::DualMaCrossover { fast, slow }
            }
            "rsi" => {
                check_keys(params, &["period", "oversold", "overbought"])?;
                let period = window_param(params, "period", 14)?;
                let oversold = level_param(params, "oversold", 30.0)?;
                let overbought = level_param(params, "overbought", 70.0)?;
                if oversold >= overbought {
                    return Err(BacktestError::invalid_param(
                        "oversold",
                        format!(
                            "oversold ({oversold}) must be below overbought ({overbought})"
                        ),
                    ));
                }
                Strategy::RsiMeanReversion {
                    period,
                    oversold,
                    overbought,
                }
            }
            "breakout" => {
                check_keys(params, &["lookback"])?;
                Strategy::MomentumBreakout {
                    lookback: window_param(params, "lookback", 20)?,
                }
            }
            _ => {
                return Err(BacktestError::UnknownStrategy {
                    name: name.to_string(),
                });
            }
        };
        Ok(strategy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DualMaCrossover { .. } => "dual_ma",
            Strategy::RsiMeanReversion { .. } => "rsi",
            Strategy::MomentumBreakout { .. } => "breakout",
        }
    }

    pub fn parameters(&self) -> StrategyParams {
        let pairs: Vec<(&str, f64)> = match *self {
            Strategy::DualMaCrossover { fast, slow } => {
                vec![("fast", fast as f64), ("slow", slow as f64)]
            }
            Strategy::RsiMeanReversion {
                period,
                oversold,
                overbought,
            } => vec![
                ("period", period as f64),
                ("oversold", oversold),
                ("overbought", overbought),
            ],
            Strategy::MomentumBreakout { lookback } => vec![("lookback", lookback as f64)],
        };
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Fewest bars on which the strategy can emit any signal.
    pub fn min_bars(&self) -> usize {
        match *self {
            Strategy::DualMaCrossover { slow, .. } => slow,
            Strategy::RsiMeanReversion { period, .. } => period + 1,
            Strategy::MomentumBreakout { lookback } => lookback + 1,
        }
    }

    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        match *self {
            Strategy::DualMaCrossover { fast, slow } => {
                vec![IndicatorType::Sma(fast), IndicatorType::Sma(slow)]
            }
            Strategy::RsiMeanReversion { period, .. } => vec![IndicatorType::Rsi(period)],
            Strategy::MomentumBreakout { lookback } => vec![
                IndicatorType::RollingHigh(lookback),
                IndicatorType::RollingLow(lookback),
            ],
        }
    }

    /// Computes the indicator cache for `series` once.
    pub fn attach<'a>(&'a self, series: &PriceSeries) -> Result<AttachedStrategy<'a>, BacktestError> {
        let cache = compute_indicators(series, &self.required_indicators())?;
        Ok(AttachedStrategy {
            strategy: self,
            cache,
        })
    }

    pub fn signal_at(&self, bar_index: usize, series: &PriceSeries, cache: &IndicatorCache) -> Signal {
        match *self {
            Strategy::DualMaCrossover { fast, slow } => {
                let relation = |i: usize| -> Option<Ordering> {
                    let f = value(cache, IndicatorType::Sma(fast), i)?;
                    let s = value(cache, IndicatorType::Sma(slow), i)?;
                    compare_averages(f, s)
                };
                let current = relation(bar_index);
                let previous = bar_index.checked_sub(1).and_then(relation);
                match (current, previous) {
                    (Some(Ordering::Greater), None | Some(Ordering::Less)) => Signal::EnterLong,
                    (Some(Ordering::Less), None | Some(Ordering::Greater)) => Signal::ExitLong,
                    _ => Signal::Hold,
                }
            }
            Strategy::RsiMeanReversion {
                period,
                oversold,
                overbought,
            } => {
                let rsi = |i: usize| value(cache, IndicatorType::Rsi(period), i);
                let Some(current) = rsi(bar_index) else {
                    return Signal::Hold;
                };
                let previous = bar_index.checked_sub(1).and_then(rsi);
                if current < oversold && previous.is_none_or(|p| p >= oversold) {
                    Signal::EnterLong
                } else if current > overbought && previous.is_none_or(|p| p <= overbought) {
                    Signal::ExitLong
                } else {
                    Signal::Hold
                }
            }
            Strategy::MomentumBreakout { lookback } => {
                let (Some(bar), Some(prior)) = (series.bar(bar_index), bar_index.checked_sub(1))
                else {
                    return Signal::Hold;
                };
                let prior_high = value(cache, IndicatorType::RollingHigh(lookback), prior);
                let prior_low = value(cache, IndicatorType::RollingLow(lookback), prior);
                match (prior_high, prior_low) {
                    (Some(high), _) if bar.close > high => Signal::EnterLong,
                    (_, Some(low)) if bar.close < low => Signal::ExitLong,
                    _ => Signal::Hold,
                }
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::DualMaCrossover { fast, slow } => {
                write!(f, "dual_ma(fast={}, slow={})", fast, slow)
            }
            Strategy::RsiMeanReversion {
                period,
                oversold,
                overbought,
            } => write!(
                f,
                "rsi(period={}, oversold={}, overbought={})",
                period, oversold, overbought
            ),
            Strategy::MomentumBreakout { lookback } => write!(f, "breakout(lookback={})", lookback),
        }
    }
}

/// A strategy bound to the indicator cache of one series.
#[derive(Debug)]
pub struct AttachedStrategy<'a> {
    strategy: &'a Strategy,
    cache: IndicatorCache,
}

impl AttachedStrategy<'_> {
    pub fn signal_at(&self, bar_index: usize, series: &PriceSeries) -> Signal {
        self.strategy.signal_at(bar_index, series, &self.cache)
    }
}

fn value(cache: &IndicatorCache, indicator: IndicatorType, bar_index: usize) -> Option<f64> {
    cache.get(&indicator)?.value_at(bar_index)
}

/// Averages within this relative distance count as touching.
const MA_EQUALITY_TOLERANCE: f64 = 1e-9;

fn compare_averages(fast: f64, slow: f64) -> Option<Ordering> {
    if (fast - slow).abs() <= MA_EQUALITY_TOLERANCE * fast.abs().max(slow.abs()) {
        return Some(Ordering::Equal);
    }
    fast.partial_cmp(&slow)
}

fn check_keys(params: &StrategyParams, allowed: &[&str]) -> Result<(), BacktestError> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(BacktestError::invalid_param(
            key,
            format!("unknown parameter (expected one of {})", allowed.join(", ")),
        )),
        None => Ok(()),
    }
}

fn window_param(params: &StrategyParams, key: &str, default: usize) -> Result<usize, BacktestError> {
    let Some(&raw) = params.get(key) else {
        return Ok(default);
    };
    if !raw.is_finite() || raw.fract() != 0.0 {
        return Err(BacktestError::invalid_param(
            key,
            format!("window must be a whole number, got {raw}"),
        ));
    }
    if raw < 1.0 {
        return Err(BacktestError::invalid_param(
            key,
            format!("window must be at least 1, got {raw}"),
        ));
    }
    Ok(raw as usize)
}

fn level_param(params: &StrategyParams, key: &str, default: f64) -> Result<f64, BacktestError> {
    let value = params.get(key).copied().unwrap_or(default);
    if !value.is_finite() || value <= 0.0 || value >= 100.0 {
        return Err(BacktestError::invalid_param(
            key,
            format!("threshold must be strictly between 0 and 100, got {value}"),
        ));
    }
    Ok(value)
}
