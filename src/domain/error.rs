//! Domain error types.

use chrono::NaiveDate;
use serde::Serialize;

/// Top-level error type for barsim.
///
/// Every variant belongs to exactly one [`ErrorKind`], which is what callers
/// outside the engine use to tell a configuration mistake from bad data or a
/// failing price source.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("unknown strategy: {name} (expected one of dual_ma, rsi, breakout)")]
    UnknownStrategy { name: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("no price data for {ticker}")]
    EmptySeries { ticker: String },

    #[error("insufficient data for {ticker}: have {bars} bars, need {minimum}")]
    InsufficientBars {
        ticker: String,
        bars: usize,
        minimum: usize,
    },

    #[error("malformed price series for {ticker} at bar {index}: {reason}")]
    MalformedSeries {
        ticker: String,
        index: usize,
        reason: String,
    },

    #[error("data source error for {ticker}: {reason}")]
    DataSource { ticker: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error classification exposed at the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InsufficientData,
    DataSource,
    Io,
}

impl BacktestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BacktestError::UnknownStrategy { .. }
            | BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. }
            | BacktestError::InvalidDateRange { .. } => ErrorKind::Configuration,
            BacktestError::EmptySeries { .. }
            | BacktestError::InsufficientBars { .. }
            | BacktestError::MalformedSeries { .. } => ErrorKind::InsufficientData,
            BacktestError::DataSource { .. } => ErrorKind::DataSource,
            BacktestError::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for an out-of-range strategy parameter.
    pub(crate) fn invalid_param(key: &str, reason: impl Into<String>) -> Self {
        BacktestError::ConfigInvalid {
            section: "strategy".into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Structured failure body handed back to the calling layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&BacktestError> for ErrorResponse {
    fn from(err: &BacktestError) -> Self {
        ErrorResponse {
            error: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::DataSource => 3,
            ErrorKind::InsufficientData => 5,
        };
        std::process::ExitCode::from(code)
    }
}
