//! Performance metrics and statistics.
//!
//! Every ratio that could divide by zero has an explicit branch; the values
//! returned here are always finite except `profit_factor`, which is infinite
//! for a run with wins and no losses.

use serde::Serialize;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

const DAYS_PER_YEAR: f64 = 365.25;
const ZERO_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Percent.
    pub total_return: f64,
    /// Percent, compounded over calendar days.
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Negative percent, 0 for a curve that never falls.
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    /// Percent.
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_days: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, bars_per_year: f64, risk_free_rate: f64) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial_capital = portfolio.initial_capital;

        let (total_return, annualized_return) = compute_returns(equity_curve, initial_capital);
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(equity_curve, bars_per_year, risk_free_rate);
        let stats = TradeStats::from_trades(&portfolio.closed_trades);

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: stats.total,
            trades_won: stats.won,
            trades_lost: stats.lost,
            trades_breakeven: stats.breakeven,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
            avg_win: average(stats.gross_wins, stats.won),
            avg_loss: average(stats.gross_losses, stats.lost),
            largest_win: stats.largest_win,
            largest_loss: stats.largest_loss,
            avg_holding_days: average(stats.holding_days as f64, stats.total),
        }
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    total: usize,
    won: usize,
    lost: usize,
    breakeven: usize,
    gross_wins: f64,
    gross_losses: f64,
    largest_win: f64,
    largest_loss: f64,
    holding_days: i64,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats {
            total: trades.len(),
            ..Default::default()
        };
        for trade in trades {
            let pnl = trade.pnl;
            if trade.is_win() {
                stats.won += 1;
                stats.gross_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if trade.is_loss() {
                stats.lost += 1;
                stats.gross_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.breakeven += 1;
            }
            stats.holding_days += trade.holding_days();
        }
        stats
    }

    fn win_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.won as f64 / self.total as f64 * 100.0
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_losses > 0.0 {
            self.gross_wins / self.gross_losses
        } else if self.gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Total and annualized return, both in percent.
fn compute_returns(equity_curve: &[EquityPoint], initial_capital: f64) -> (f64, f64) {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return (0.0, 0.0);
    };
    if initial_capital <= 0.0 {
        return (0.0, 0.0);
    }

    let growth = last.equity / initial_capital;
    let total_return = (growth - 1.0) * 100.0;

    let days_spanned = (last.date - first.date).num_days();
    let annualized_return = if days_spanned == 0 {
        total_return
    } else if growth <= 0.0 {
        -100.0
    } else {
        let annualized = (growth.powf(DAYS_PER_YEAR / days_spanned as f64) - 1.0) * 100.0;
        if annualized.is_finite() { annualized } else { f64::MAX }
    };

    (total_return, annualized_return)
}

/// Maximum drawdown as a negative percentage, and its longest duration in bars.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut max_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            underwater = 0;
            continue;
        }
        underwater += 1;
        max_duration = max_duration.max(underwater);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }

    let max_drawdown = if max_dd > 0.0 { -max_dd * 100.0 } else { 0.0 };
    (max_drawdown, max_duration)
}

/// Per-bar returns of the curve; a non-positive prior equity yields 0.
fn bar_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 { (w[1].equity - prev) / prev } else { 0.0 }
        })
        .collect()
}

fn compute_risk_adjusted(
    equity_curve: &[EquityPoint],
    bars_per_year: f64,
    risk_free_rate: f64,
) -> (f64, f64) {
    let returns = bar_returns(equity_curve);
    if returns.is_empty() || bars_per_year <= 0.0 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let bar_rf = risk_free_rate / bars_per_year;
    let excess_return = mean - bar_rf;
    let annualizer = bars_per_year.sqrt();

    let sharpe = if stddev > ZERO_VARIANCE {
        excess_return / stddev * annualizer
    } else {
        0.0
    };

    let downside_variance = returns
        .iter()
        .filter(|&&r| r < bar_rf)
        .map(|&r| (r - bar_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside_variance.sqrt();

    let sortino = if downside_stddev > ZERO_VARIANCE {
        excess_return / downside_stddev * annualizer
    } else {
        0.0
    };

    (sharpe, sortino)
}
