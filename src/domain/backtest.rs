//! Backtest engine and event loop.
//!
//! One sequential pass over the series. Every bar: ask the strategy for a
//! signal, act on it against the single position, then mark equity. The
//! portfolio is owned by the loop and only handed out once the pass is over.

use tracing::{debug, warn};

use super::error::BacktestError;
use super::execution::{enter_long, exit_position, EntryResult, ExecutionConfig};
use super::ohlcv::PriceSeries;
use super::portfolio::Portfolio;
use super::position::ExitReason;
use super::strategy::{Signal, Strategy};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub position_size: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    /// Force-close an open position on the last bar.
    pub liquidate_at_end: bool,
    /// Annualization factor for per-bar statistics.
    pub bars_per_year: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            position_size: 1.0,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            liquidate_at_end: true,
            bars_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        let invalid = |key: &str, reason: &str| BacktestError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: reason.into(),
        };

        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital", "initial_capital must be positive"));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(invalid("position_size", "position_size must be in (0, 1]"));
        }
        for (key, value) in [
            ("commission_per_trade", self.commission_per_trade),
            ("commission_pct", self.commission_pct),
            ("slippage_pct", self.slippage_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, &format!("{key} must be non-negative")));
            }
        }
        if self.slippage_pct >= 100.0 {
            return Err(invalid("slippage_pct", "slippage_pct must be below 100"));
        }
        if !self.bars_per_year.is_finite() || self.bars_per_year <= 0.0 {
            return Err(invalid("bars_per_year", "bars_per_year must be positive"));
        }
        if !(0.0..1.0).contains(&self.risk_free_rate) {
            return Err(invalid("risk_free_rate", "risk_free_rate must be between 0 and 1"));
        }
        Ok(())
    }

    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            position_size: self.position_size,
            commission_per_trade: self.commission_per_trade,
            commission_pct: self.commission_pct,
            slippage_pct: self.slippage_pct,
        }
    }
}

/// Everything a single pass produces.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub portfolio: Portfolio,
    /// True when the series was shorter than the strategy's lookback and the
    /// pass only recorded a flat equity curve.
    pub warmup_only: bool,
    pub entries_skipped: usize,
}

pub fn run_backtest(
    series: &PriceSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestRun, BacktestError> {
    config.validate()?;

    let mut portfolio = Portfolio::new(config.initial_capital);

    if series.len() < strategy.min_bars() {
        debug!(
            ticker = series.ticker(),
            bars = series.len(),
            needed = strategy.min_bars(),
            "series shorter than strategy lookback, no trades possible"
        );
        for bar in series.bars() {
            portfolio.record_equity(bar.date, config.initial_capital);
        }
        return Ok(BacktestRun {
            portfolio,
            warmup_only: true,
            entries_skipped: 0,
        });
    }

    let attached = strategy.attach(series)?;
    let execution = config.execution();
    let last_index = series.len() - 1;
    let mut entries_skipped = 0usize;

    for (i, bar) in series.bars().iter().enumerate() {
        let closing_bar = i == last_index && config.liquidate_at_end;
        match attached.signal_at(i, series) {
            // A position opened on the closing bar could never be held.
            Signal::EnterLong if closing_bar => {
                debug!(date = %bar.date, "entry signal on final bar ignored");
            }
            Signal::EnterLong if portfolio.is_flat() => {
                if let EntryResult::InsufficientCapital =
                    enter_long(&mut portfolio, bar.close, bar.date, &execution)
                {
                    entries_skipped += 1;
                    warn!(date = %bar.date, price = bar.close, cash = portfolio.cash, "entry skipped: insufficient capital");
                }
            }
            Signal::ExitLong if !portfolio.is_flat() => {
                exit_position(&mut portfolio, bar.close, bar.date, ExitReason::Signal, &execution);
            }
            _ => {}
        }

        if closing_bar
            && exit_position(&mut portfolio, bar.close, bar.date, ExitReason::EndOfData, &execution)
        {
            debug!(date = %bar.date, "liquidated open position at end of data");
        }

        let equity = portfolio.total_equity(bar.close);
        portfolio.record_equity(bar.date, equity);
    }

    debug!(
        ticker = series.ticker(),
        strategy = %strategy,
        bars = series.len(),
        trades = portfolio.closed_trades.len(),
        "backtest pass complete"
    );

    Ok(BacktestRun {
        portfolio,
        warmup_only: false,
        entries_skipped,
    })
}
