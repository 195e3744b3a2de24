//! Configuration validation.
//!
//! Reads the `[backtest]` and `[strategy]` sections into domain values,
//! rejecting anything present but unparsable instead of silently falling back
//! to a default.

use chrono::NaiveDate;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BacktestError;
use crate::domain::ohlcv::DateRange;
use crate::domain::strategy::{Strategy, StrategyParams};
use crate::ports::config_port::ConfigPort;

pub const BACKTEST: &str = "backtest";
pub const STRATEGY: &str = "strategy";
pub const DATA: &str = "data";

/// Everything needed to run from a config file except the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub backtest: BacktestConfig,
    pub strategy_name: String,
    pub strategy_params: StrategyParams,
    pub strategy: Strategy,
    pub date_range: Option<DateRange>,
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<ValidatedConfig, BacktestError> {
    let backtest = read_backtest_config(config)?;
    let (strategy_name, strategy_params) = read_strategy_params(config)?;
    let strategy = Strategy::from_name(&strategy_name, &strategy_params)?;
    let date_range = read_date_range(config)?;
    Ok(ValidatedConfig {
        backtest,
        strategy_name,
        strategy_params,
        strategy,
        date_range,
    })
}

pub fn read_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let defaults = BacktestConfig::default();
    let parsed = BacktestConfig {
        initial_capital: number(config, BACKTEST, "initial_capital", defaults.initial_capital)?,
        position_size: number(config, BACKTEST, "position_size", defaults.position_size)?,
        commission_per_trade: number(
            config,
            BACKTEST,
            "commission_per_trade",
            defaults.commission_per_trade,
        )?,
        commission_pct: number(config, BACKTEST, "commission_pct", defaults.commission_pct)?,
        slippage_pct: number(config, BACKTEST, "slippage_pct", defaults.slippage_pct)?,
        liquidate_at_end: flag(config, BACKTEST, "liquidate_at_end", defaults.liquidate_at_end)?,
        bars_per_year: number(config, BACKTEST, "bars_per_year", defaults.bars_per_year)?,
        risk_free_rate: number(config, BACKTEST, "risk_free_rate", defaults.risk_free_rate)?,
    };
    parsed.validate()?;
    Ok(parsed)
}

/// Strategy name plus every other key of `[strategy]` as a numeric parameter.
pub fn read_strategy_params(
    config: &dyn ConfigPort,
) -> Result<(String, StrategyParams), BacktestError> {
    let name = match config.get_string(STRATEGY, "name") {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            return Err(BacktestError::ConfigMissing {
                section: STRATEGY.to_string(),
                key: "name".to_string(),
            });
        }
    };

    let mut params = StrategyParams::new();
    for key in config.keys(STRATEGY) {
        if key == "name" {
            continue;
        }
        if raw(config, STRATEGY, &key).is_none() {
            return Err(invalid(STRATEGY, &key, "parameter has no value".to_string()));
        }
        let value = number(config, STRATEGY, &key, 0.0)?;
        params.insert(key, value);
    }
    Ok((name, params))
}

/// Optional `start_date` / `end_date`; either bound may be omitted.
pub fn read_date_range(config: &dyn ConfigPort) -> Result<Option<DateRange>, BacktestError> {
    let start = date(config, "start_date")?;
    let end = date(config, "end_date")?;
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    DateRange::new(
        start.unwrap_or(NaiveDate::MIN),
        end.unwrap_or(NaiveDate::MAX),
    )
    .map(Some)
}

pub fn read_ticker(config: &dyn ConfigPort) -> Option<String> {
    config
        .get_string(BACKTEST, "ticker")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn read_data_directory(config: &dyn ConfigPort) -> Option<String> {
    config
        .get_string(DATA, "directory")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn raw(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, reason: String) -> BacktestError {
    BacktestError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, BacktestError> {
    match raw(config, section, key) {
        None => Ok(default),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("expected a number, got '{s}'"))),
    }
}

fn flag(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, BacktestError> {
    if raw(config, section, key).is_none() {
        return Ok(default);
    }
    // Probe with both defaults: a recognized spelling ignores them.
    let as_true = config.get_bool(section, key, true);
    let as_false = config.get_bool(section, key, false);
    if as_true == as_false {
        Ok(as_true)
    } else {
        Err(invalid(section, key, "expected true or false".to_string()))
    }
}

fn date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, BacktestError> {
    match raw(config, BACKTEST, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(BACKTEST, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}
