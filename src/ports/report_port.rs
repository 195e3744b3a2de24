//! Report generation port trait.

use crate::domain::engine::BacktestResult;
use crate::domain::error::BacktestError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), BacktestError>;
}
