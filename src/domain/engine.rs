//! Request/response boundary of the engine.
//!
//! A caller hands over a [`BacktestRequest`]; everything in it is validated
//! before the data port is touched, then the series is loaded, simulated and
//! analyzed into a [`BacktestResult`]. Failures come back as
//! [`BacktestError`], which converts into the serializable
//! [`ErrorResponse`](super::error::ErrorResponse).

use serde::{Deserialize, Serialize};
use tracing::info;

use super::backtest::{run_backtest, BacktestConfig};
use super::error::BacktestError;
use super::metrics::Metrics;
use super::ohlcv::{DateRange, PriceSeries};
use super::portfolio::EquityPoint;
use super::position::ClosedTrade;
use super::strategy::{Strategy, StrategyParams};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BacktestRequest {
    pub ticker: String,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "StrategyParams::is_empty")]
    pub parameters: StrategyParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_capital: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl BacktestRequest {
    pub fn new(ticker: impl Into<String>, strategy: impl Into<String>) -> Self {
        BacktestRequest {
            ticker: ticker.into(),
            strategy: strategy.into(),
            parameters: StrategyParams::new(),
            initial_capital: None,
            date_range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub ticker: String,
    pub strategy: String,
    pub parameters: StrategyParams,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
}

/// A result together with the full statistics it was summarized from.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: BacktestResult,
    pub metrics: Metrics,
}

/// A request after validation: nothing here can fail for configuration
/// reasons any more.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub ticker: String,
    pub strategy: Strategy,
    pub config: BacktestConfig,
    pub date_range: Option<DateRange>,
}

pub fn resolve_request(
    request: &BacktestRequest,
    base: &BacktestConfig,
) -> Result<ResolvedRequest, BacktestError> {
    let ticker = request.ticker.trim();
    if ticker.is_empty() {
        return Err(BacktestError::ConfigMissing {
            section: "request".into(),
            key: "ticker".into(),
        });
    }

    let strategy = Strategy::from_name(&request.strategy, &request.parameters)?;

    let mut config = base.clone();
    if let Some(capital) = request.initial_capital {
        config.initial_capital = capital;
    }
    config.validate()?;

    if let Some(range) = &request.date_range {
        range.validate()?;
    }

    Ok(ResolvedRequest {
        ticker: ticker.to_string(),
        strategy,
        config,
        date_range: request.date_range,
    })
}

pub fn load_series(
    data: &dyn DataPort,
    ticker: &str,
    range: Option<DateRange>,
) -> Result<PriceSeries, BacktestError> {
    let bars = data.fetch_ohlcv(ticker, range)?;
    PriceSeries::new(ticker, bars)
}

/// Simulates and analyzes one strategy over one series.
pub fn evaluate(
    series: &PriceSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<Evaluation, BacktestError> {
    let run = run_backtest(series, strategy, config)?;
    let metrics = Metrics::compute(&run.portfolio, config.bars_per_year, config.risk_free_rate);

    let result = BacktestResult {
        ticker: series.ticker().to_string(),
        strategy: strategy.name().to_string(),
        parameters: strategy.parameters(),
        total_return: metrics.total_return,
        annualized_return: metrics.annualized_return,
        sharpe_ratio: metrics.sharpe_ratio,
        max_drawdown: metrics.max_drawdown,
        win_rate: metrics.win_rate,
        total_trades: metrics.total_trades,
        equity_curve: run.portfolio.equity_curve,
        trades: run.portfolio.closed_trades,
    };

    Ok(Evaluation { result, metrics })
}

pub fn run_with_series(
    series: &PriceSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    evaluate(series, strategy, config).map(|e| e.result)
}

pub fn evaluate_request(
    data: &dyn DataPort,
    request: &BacktestRequest,
    base: &BacktestConfig,
) -> Result<Evaluation, BacktestError> {
    let resolved = resolve_request(request, base)?;
    info!(
        ticker = %resolved.ticker,
        strategy = %resolved.strategy,
        capital = resolved.config.initial_capital,
        "running backtest"
    );

    let series = load_series(data, &resolved.ticker, resolved.date_range)?;
    evaluate(&series, &resolved.strategy, &resolved.config)
}

pub fn run_request(
    data: &dyn DataPort,
    request: &BacktestRequest,
    base: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    evaluate_request(data, request, base).map(|e| e.result)
}
