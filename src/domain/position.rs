//! Open position and closed trade records.

use chrono::NaiveDate;
use serde::Serialize;

/// The single long position a run may hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub quantity: u64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_commission: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    EndOfData,
}

/// Immutable record of a round trip, written once when a position closes.
///
/// `pnl` is the pure price difference times quantity; commissions are kept
/// apart in `commission` and only show up in cash and equity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub commission: f64,
    pub exit_reason: ExitReason,
}

impl ClosedTrade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}
