//! Trade execution and fill simulation.
//!
//! Fills happen at the bar's close, adjusted by optional slippage, with whole
//! units only. Commission and slippage default to zero.

use chrono::NaiveDate;
use tracing::debug;

use super::portfolio::Portfolio;
use super::position::{ClosedTrade, ExitReason, Position};

/// Fill and sizing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Fraction of available cash committed on entry, in (0, 1].
    pub position_size: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            position_size: 1.0,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Long entry (buy): execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_long_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Long exit (sell): execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_long_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered,
    AlreadyOpen,
    InsufficientCapital,
}

/// Open the long position.
///
/// 1. Apply slippage to execution price
/// 2. Size: floor(cash * position_size / execution_price) whole units,
///    reduced if cost + commission would exceed cash
/// 3. Reject a zero quantity
/// 4. Deduct cost + commission from cash and store the position
pub fn enter_long(
    portfolio: &mut Portfolio,
    market_price: f64,
    date: NaiveDate,
    config: &ExecutionConfig,
) -> EntryResult {
    if !portfolio.is_flat() {
        return EntryResult::AlreadyOpen;
    }

    let execution_price = apply_slippage_long_entry(market_price, config.slippage_pct);
    let available_capital = portfolio.cash * config.position_size;
    let mut units = (available_capital / execution_price).floor();

    // Commission must fit too: shrink to what cash covers after fees.
    if units * execution_price + calculate_commission(units * execution_price, config)
        > portfolio.cash
    {
        let unit_cost = execution_price * (1.0 + config.commission_pct / 100.0);
        units = ((portfolio.cash - config.commission_per_trade) / unit_cost).floor();
    }

    if !units.is_finite() || units < 1.0 {
        return EntryResult::InsufficientCapital;
    }
    let quantity = units as u64;

    let cost = quantity as f64 * execution_price;
    let commission = calculate_commission(cost, config);
    let total_cost = cost + commission;

    if total_cost > portfolio.cash {
        return EntryResult::InsufficientCapital;
    }

    portfolio.cash -= total_cost;
    portfolio.position = Some(Position {
        quantity,
        entry_price: execution_price,
        entry_date: date,
        entry_commission: commission,
    });

    debug!(%date, quantity, price = execution_price, commission, "entered long");

    EntryResult::Entered
}

/// Close the open position, if any.
///
/// 1. Apply slippage to the exit price
/// 2. pnl = (exit_price - entry_price) * quantity
/// 3. Credit sale proceeds minus commission to cash
/// 4. Record the closed trade
///
/// Returns false when there was nothing to close.
pub fn exit_position(
    portfolio: &mut Portfolio,
    market_price: f64,
    exit_date: NaiveDate,
    reason: ExitReason,
    config: &ExecutionConfig,
) -> bool {
    let Some(position) = portfolio.position.take() else {
        return false;
    };

    let exit_price = apply_slippage_long_exit(market_price, config.slippage_pct);
    let quantity = position.quantity;
    let exit_value = quantity as f64 * exit_price;
    let exit_commission = calculate_commission(exit_value, config);

    let pnl = (exit_price - position.entry_price) * quantity as f64;
    let pnl_pct = (exit_price / position.entry_price - 1.0) * 100.0;

    portfolio.cash += exit_value - exit_commission;

    debug!(
        date = %exit_date,
        quantity,
        price = exit_price,
        pnl,
        ?reason,
        "closed long"
    );

    portfolio.record_trade(ClosedTrade {
        entry_date: position.entry_date,
        exit_date,
        entry_price: position.entry_price,
        exit_price,
        quantity,
        pnl,
        pnl_pct,
        commission: position.entry_commission + exit_commission,
        exit_reason: reason,
    });

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_config() -> ExecutionConfig {
        ExecutionConfig {
            position_size: 0.25,
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            slippage_pct: 0.05,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn calculate_commission_basic() {
        let config = ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            ..Default::default()
        };
        let expected = 10.0 + (10000.0 * 0.1 / 100.0);
        assert!((calculate_commission(10000.0, &config) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn default_config_is_zero_cost_full_capital() {
        let config = ExecutionConfig::default();
        assert_eq!(config.position_size, 1.0);
        assert_eq!(calculate_commission(50_000.0, &config), 0.0);
        assert_eq!(apply_slippage_long_entry(100.0, config.slippage_pct), 100.0);
    }

    #[test]
    fn slippage_directions() {
        assert_relative_eq!(apply_slippage_long_entry(100.0, 1.0), 101.0);
        assert_relative_eq!(apply_slippage_long_exit(100.0, 1.0), 99.0);
    }

    #[test]
    fn enter_long_full_capital_whole_units() {
        let mut portfolio = Portfolio::new(1000.0);
        let result = enter_long(&mut portfolio, 30.0, date(), &ExecutionConfig::default());

        assert_eq!(result, EntryResult::Entered);
        assert_relative_eq!(portfolio.cash, 10.0);
        let position = portfolio.position.as_ref().unwrap();
        assert_eq!(position.quantity, 33);
        assert_eq!(position.entry_price, 30.0);
        assert_eq!(position.entry_commission, 0.0);
    }

    #[test]
    fn enter_long_with_costs() {
        let mut portfolio = Portfolio::new(100_000.0);
        let config = make_config();
        let result = enter_long(&mut portfolio, 100.0, date(), &config);

        let exec: f64 = 100.0 * 1.0005;
        let quantity = (25_000.0 / exec).floor();
        let cost = quantity * exec;
        let commission = 10.0 + cost * 0.1 / 100.0;

        assert_eq!(result, EntryResult::Entered);
        let position = portfolio.position.as_ref().unwrap();
        assert_eq!(position.quantity as f64, quantity);
        assert_relative_eq!(position.entry_price, exec);
        assert_relative_eq!(position.entry_commission, commission, epsilon = 1e-9);
        assert_relative_eq!(portfolio.cash, 100_000.0 - cost - commission, epsilon = 1e-9);
    }

    #[test]
    fn enter_long_rejects_when_price_exceeds_cash() {
        let mut portfolio = Portfolio::new(50.0);
        let result = enter_long(&mut portfolio, 60.0, date(), &ExecutionConfig::default());
        assert_eq!(result, EntryResult::InsufficientCapital);
        assert!(portfolio.is_flat());
        assert_relative_eq!(portfolio.cash, 50.0);
    }

    #[test]
    fn enter_long_rejects_when_commission_exceeds_cash() {
        let mut portfolio = Portfolio::new(52.0);
        let config = ExecutionConfig {
            commission_per_trade: 5.0,
            ..Default::default()
        };
        assert_eq!(
            enter_long(&mut portfolio, 50.0, date(), &config),
            EntryResult::InsufficientCapital
        );
    }

    #[test]
    fn enter_long_refuses_second_position() {
        let mut portfolio = Portfolio::new(1000.0);
        let config = ExecutionConfig {
            position_size: 0.5,
            ..Default::default()
        };
        enter_long(&mut portfolio, 10.0, date(), &config);
        assert_eq!(
            enter_long(&mut portfolio, 10.0, date(), &config),
            EntryResult::AlreadyOpen
        );
    }

    #[test]
    fn exit_records_trade_and_credits_cash() {
        let mut portfolio = Portfolio::new(1000.0);
        let config = ExecutionConfig::default();
        enter_long(&mut portfolio, 10.0, date(), &config);

        let exit_date = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        assert!(exit_position(&mut portfolio, 12.0, exit_date, ExitReason::Signal, &config));

        assert_relative_eq!(portfolio.cash, 1200.0);
        assert!(portfolio.is_flat());

        let trade = &portfolio.closed_trades[0];
        assert_eq!(trade.quantity, 100);
        assert_relative_eq!(trade.pnl, 200.0);
        assert_eq!(trade.entry_date, date());
        assert_eq!(trade.exit_date, exit_date);
        assert_relative_eq!(trade.pnl_pct, 20.0, epsilon = 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::Signal);
    }

    #[test]
    fn exit_keeps_commission_out_of_pnl() {
        let mut portfolio = Portfolio::new(1000.0);
        let config = ExecutionConfig {
            commission_per_trade: 1.0,
            ..Default::default()
        };
        enter_long(&mut portfolio, 10.0, date(), &config);
        exit_position(&mut portfolio, 10.0, date(), ExitReason::EndOfData, &config);

        let trade = &portfolio.closed_trades[0];
        assert_eq!(trade.pnl, 0.0);
        assert_relative_eq!(trade.commission, 2.0);
        // 99 units: 1000 - 990 - 1 + 990 - 1
        assert_relative_eq!(portfolio.cash, 998.0);
    }

    #[test]
    fn exit_without_position_is_noop() {
        let mut portfolio = Portfolio::new(1000.0);
        let config = ExecutionConfig::default();
        assert!(!exit_position(&mut portfolio, 10.0, date(), ExitReason::Signal, &config));
        assert!(portfolio.closed_trades.is_empty());
        assert_relative_eq!(portfolio.cash, 1000.0);
    }
}
