//! Parameter sweeps: one strategy, one series, many parameter sets.
//!
//! Combinations run in parallel on the rayon pool. Each gets its own strategy
//! and portfolio over the shared read-only series, and the report keeps the
//! grid order no matter how the work was scheduled.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::backtest::BacktestConfig;
use super::engine::evaluate;
use super::error::{BacktestError, ErrorResponse};
use super::metrics::Metrics;
use super::ohlcv::PriceSeries;
use super::strategy::{Strategy, StrategyParams};

/// Cartesian product of named parameter axes.
///
/// Axes are kept sorted by name and the last axis varies fastest, so the
/// enumeration order depends only on the grid's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGrid {
    axes: BTreeMap<String, Vec<f64>>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, key: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.insert(key.into(), values);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Number of combinations; an empty grid still yields the base set.
    pub fn len(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut out = vec![StrategyParams::new()];
        for (key, values) in &self.axes {
            out = out
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |&v| {
                        let mut next = partial.clone();
                        next.insert(key.clone(), v);
                        next
                    })
                })
                .collect();
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    SharpeRatio,
    TotalReturn,
    AnnualizedReturn,
    MaxDrawdown,
    WinRate,
}

impl RankBy {
    fn score(self, m: &Metrics) -> f64 {
        match self {
            RankBy::SharpeRatio => m.sharpe_ratio,
            RankBy::TotalReturn => m.total_return,
            RankBy::AnnualizedReturn => m.annualized_return,
            // closest to zero is best
            RankBy::MaxDrawdown => m.max_drawdown,
            RankBy::WinRate => m.win_rate,
        }
    }
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sharpe" | "sharpe_ratio" => Ok(RankBy::SharpeRatio),
            "return" | "total_return" => Ok(RankBy::TotalReturn),
            "annualized" | "annualized_return" => Ok(RankBy::AnnualizedReturn),
            "drawdown" | "max_drawdown" => Ok(RankBy::MaxDrawdown),
            "win_rate" => Ok(RankBy::WinRate),
            other => Err(format!("unknown ranking metric: {other}")),
        }
    }
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RankBy::SharpeRatio => "sharpe_ratio",
            RankBy::TotalReturn => "total_return",
            RankBy::AnnualizedReturn => "annualized_return",
            RankBy::MaxDrawdown => "max_drawdown",
            RankBy::WinRate => "win_rate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed { metrics: Metrics },
    Failed { error: ErrorResponse },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepEntry {
    pub parameters: StrategyParams,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

impl SweepEntry {
    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            SweepOutcome::Completed { metrics } => Some(metrics),
            SweepOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub ticker: String,
    pub strategy: String,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.metrics().is_none()).count()
    }

    /// Completed entries, best first. Ties keep grid order.
    pub fn ranked(&self, by: RankBy) -> Vec<&SweepEntry> {
        let mut completed: Vec<&SweepEntry> =
            self.entries.iter().filter(|e| e.metrics().is_some()).collect();
        completed.sort_by(|a, b| {
            let score = |e: &SweepEntry| e.metrics().map_or(f64::NEG_INFINITY, |m| by.score(m));
            score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal)
        });
        completed
    }

    pub fn best(&self, by: RankBy) -> Option<&SweepEntry> {
        self.ranked(by).into_iter().next()
    }
}

/// Runs every combination of `grid` layered over `base` parameters.
///
/// The strategy name and the backtest config are checked up front; a bad
/// combination (say fast >= slow) only fails its own entry.
pub fn run_sweep(
    series: &PriceSeries,
    strategy_name: &str,
    base: &StrategyParams,
    grid: &ParameterGrid,
    config: &BacktestConfig,
) -> Result<SweepReport, BacktestError> {
    config.validate()?;
    let strategy_name = Strategy::from_name(strategy_name, &StrategyParams::new())?
        .name()
        .to_string();

    let combinations = grid.combinations();
    info!(
        ticker = series.ticker(),
        strategy = %strategy_name,
        combinations = combinations.len(),
        "starting parameter sweep"
    );

    let entries: Vec<SweepEntry> = combinations
        .into_par_iter()
        .map(|overrides| {
            let mut parameters = base.clone();
            parameters.extend(overrides);

            let outcome = Strategy::from_name(&strategy_name, &parameters)
                .and_then(|strategy| evaluate(series, &strategy, config))
                .map_or_else(
                    |err| {
                        warn!(?parameters, error = %err, "sweep combination failed");
                        SweepOutcome::Failed {
                            error: ErrorResponse::from(&err),
                        }
                    },
                    |evaluation| SweepOutcome::Completed {
                        metrics: evaluation.metrics,
                    },
                );

            SweepEntry {
                parameters,
                outcome,
            }
        })
        .collect();

    Ok(SweepReport {
        ticker: series.ticker().to_string(),
        strategy: strategy_name,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;

    fn wave_series(n: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = (0..n)
            .map(|i| {
                let close = 100.0 + 10.0 * (i as f64 / 6.0).sin() + i as f64 * 0.1;
                OhlcvBar {
                    date: start + chrono::Duration::days(i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0,
                }
            })
            .collect();
        PriceSeries::new("WAVE", bars).unwrap()
    }

    #[test]
    fn grid_enumerates_in_key_order() {
        let grid = ParameterGrid::new()
            .axis("slow", vec![20.0, 30.0])
            .axis("fast", vec![5.0, 10.0]);
        let combos = grid.combinations();

        assert_eq!(grid.len(), 4);
        assert_eq!(combos.len(), 4);
        let pairs: Vec<(f64, f64)> = combos.iter().map(|c| (c["fast"], c["slow"])).collect();
        assert_eq!(
            pairs,
            vec![(5.0, 20.0), (5.0, 30.0), (10.0, 20.0), (10.0, 30.0)]
        );
    }

    #[test]
    fn empty_grid_is_single_base_run() {
        let grid = ParameterGrid::new();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.combinations(), vec![StrategyParams::new()]);
    }

    #[test]
    fn sweep_keeps_grid_order_and_isolates_failures() {
        let series = wave_series(120);
        let grid = ParameterGrid::new()
            .axis("fast", vec![5.0, 40.0])
            .axis("slow", vec![20.0, 30.0]);
        let report = run_sweep(
            &series,
            "dual_ma",
            &StrategyParams::new(),
            &grid,
            &BacktestConfig::default(),
        )
        .unwrap();

        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.entries[0].parameters["fast"], 5.0);
        assert_eq!(report.entries[0].parameters["slow"], 20.0);
        // fast=40 is never shorter than slow
        assert_eq!(report.failures(), 2);
        for entry in &report.entries[2..] {
            match &entry.outcome {
                SweepOutcome::Failed { error } => assert_eq!(error.error, ErrorKind::Configuration),
                other => panic!("expected failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn sweep_matches_sequential_runs() {
        let series = wave_series(150);
        let grid = ParameterGrid::new().axis("lookback", vec![5.0, 10.0, 20.0]);
        let config = BacktestConfig::default();
        let report =
            run_sweep(&series, "breakout", &StrategyParams::new(), &grid, &config).unwrap();

        for (entry, lookback) in report.entries.iter().zip([5usize, 10, 20]) {
            let strategy = Strategy::MomentumBreakout { lookback };
            let expected = evaluate(&series, &strategy, &config).unwrap().metrics;
            assert_eq!(entry.metrics(), Some(&expected));
        }
    }

    #[test]
    fn base_parameters_apply_to_every_entry() {
        let series = wave_series(80);
        let base: StrategyParams = [("overbought".to_string(), 65.0)].into_iter().collect();
        let grid = ParameterGrid::new().axis("period", vec![7.0, 14.0]);
        let report = run_sweep(&series, "RSI", &base, &grid, &BacktestConfig::default()).unwrap();

        assert_eq!(report.strategy, "rsi");
        assert!(report.entries.iter().all(|e| e.parameters["overbought"] == 65.0));
    }

    #[test]
    fn unknown_strategy_fails_whole_sweep() {
        let series = wave_series(30);
        let err = run_sweep(
            &series,
            "foo",
            &StrategyParams::new(),
            &ParameterGrid::new(),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::UnknownStrategy { .. }));
    }

    #[test]
    fn ranking_puts_best_first() {
        let series = wave_series(200);
        let grid = ParameterGrid::new().axis("lookback", vec![3.0, 8.0, 15.0, 30.0]);
        let report = run_sweep(
            &series,
            "breakout",
            &StrategyParams::new(),
            &grid,
            &BacktestConfig::default(),
        )
        .unwrap();

        let ranked = report.ranked(RankBy::TotalReturn);
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            let a = pair[0].metrics().unwrap().total_return;
            let b = pair[1].metrics().unwrap().total_return;
            assert!(a >= b);
        }
        assert_eq!(report.best(RankBy::TotalReturn), ranked.first().copied());
    }

    #[test]
    fn rank_by_parses_aliases() {
        assert_eq!("sharpe".parse::<RankBy>().unwrap(), RankBy::SharpeRatio);
        assert_eq!("max-drawdown".parse::<RankBy>().unwrap(), RankBy::MaxDrawdown);
        assert!("volume".parse::<RankBy>().is_err());
        assert_eq!(RankBy::WinRate.to_string(), "win_rate");
    }

    #[test]
    fn report_serializes_status_tag() {
        let series = wave_series(60);
        let grid = ParameterGrid::new().axis("fast", vec![5.0, 50.0]);
        let base: StrategyParams = [("slow".to_string(), 20.0)].into_iter().collect();
        let report =
            run_sweep(&series, "dual_ma", &base, &grid, &BacktestConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["entries"][0]["status"], "completed");
        assert!(json["entries"][0]["metrics"]["sharpeRatio"].is_number());
        assert_eq!(json["entries"][1]["status"], "failed");
        assert_eq!(json["entries"][1]["error"]["error"], "configuration");
    }
}
