//! Price data access port trait.

use chrono::NaiveDate;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{DateRange, OhlcvBar};

/// Source of historical bars for a ticker.
///
/// Implementations report their own failures as
/// [`BacktestError::DataSource`]; the engine passes them through untouched.
pub trait DataPort {
    /// Bars for `ticker` in ascending date order, optionally narrowed to `range`.
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<OhlcvBar>, BacktestError>;

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError>;

    /// First date, last date and bar count, or `None` if the ticker has no data.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError>;
}
