//! CLI definition and dispatch.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::{JsonReportAdapter, STDOUT_PATH};
use crate::domain::backtest::BacktestConfig;
use crate::domain::config_validation::{
    read_backtest_config, read_data_directory, read_date_range, read_strategy_params,
    read_ticker, validate_config, DATA,
};
use crate::domain::engine::{self, BacktestRequest, Evaluation};
use crate::domain::error::{BacktestError, ErrorResponse};
use crate::domain::metrics::Metrics;
use crate::domain::strategy::STRATEGY_NAMES;
use crate::domain::sweep::{run_sweep, ParameterGrid, RankBy, SweepReport};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "barsim", about = "Single-asset strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest described by an INI config
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Report path, `-` for stdout
        #[arg(short, long, default_value = STDOUT_PATH)]
        output: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a JSON backtest request, answering with a JSON result or error body
    Run {
        /// Request file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Optional INI config supplying costs and the data directory
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a strategy over a grid of parameters in parallel
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        /// Grid axis, e.g. `fast=5,10,20` or `lookback=10..50:10`
        #[arg(short, long = "grid", value_parser = parse_grid_axis)]
        grid: Vec<(String, Vec<f64>)>,
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long, default_value = "sharpe")]
        rank_by: RankBy,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Write the full sweep report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a config without touching any data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data range for one or all tickers
    Info {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List tickers available in the data directory
    ListTickers {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseParamError {
    #[error("expected KEY=VALUES, got '{0}'")]
    MissingEquals(String),
    #[error("empty parameter name in '{0}'")]
    EmptyKey(String),
    #[error("no values given for {0}")]
    NoValues(String),
    #[error("invalid number '{value}' for {key}")]
    InvalidNumber { key: String, value: String },
    #[error("invalid range '{value}' for {key}: expected START..END:STEP with a positive step")]
    InvalidRange { key: String, value: String },
}

/// Most values a single `start..end:step` axis may expand to.
pub const MAX_AXIS_VALUES: usize = 10_000;

/// Parses one sweep axis: `key=v1,v2,...` or `key=start..end:step` (inclusive).
pub fn parse_grid_axis(s: &str) -> Result<(String, Vec<f64>), ParseParamError> {
    let (key, values) = s
        .split_once('=')
        .ok_or_else(|| ParseParamError::MissingEquals(s.to_string()))?;
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return Err(ParseParamError::EmptyKey(s.to_string()));
    }
    let values = values.trim();
    if values.is_empty() {
        return Err(ParseParamError::NoValues(key));
    }

    if let Some((range, step)) = values.split_once(':') {
        return parse_range(&key, range, step).map(|v| (key, v));
    }

    let parsed = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f64>().map_err(|_| ParseParamError::InvalidNumber {
                key: key.clone(),
                value: v.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if parsed.is_empty() {
        return Err(ParseParamError::NoValues(key));
    }
    Ok((key, parsed))
}

fn parse_range(key: &str, range: &str, step: &str) -> Result<Vec<f64>, ParseParamError> {
    let bad = || ParseParamError::InvalidRange {
        key: key.to_string(),
        value: format!("{range}:{step}"),
    };
    let (start, end) = range.split_once("..").ok_or_else(bad)?;
    let start: f64 = start.trim().parse().map_err(|_| bad())?;
    let end: f64 = end.trim().parse().map_err(|_| bad())?;
    let step: f64 = step.trim().parse().map_err(|_| bad())?;
    if !(step > 0.0) || !start.is_finite() || !end.is_finite() || end < start {
        return Err(bad());
    }

    let steps = ((end - start) / step + 1e-9).floor();
    if !steps.is_finite() || steps >= MAX_AXIS_VALUES as f64 {
        return Err(bad());
    }
    let count = (steps as usize).checked_add(1).ok_or_else(bad)?;
    Ok((0..count).map(|i| start + step * i as f64).collect())
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            ticker,
            data_dir,
            output,
            dry_run,
        } => {
            if dry_run {
                run_validate(&config)
            } else {
                run_backtest(&config, ticker.as_deref(), data_dir.as_deref(), &output)
            }
        }
        Command::Run {
            input,
            data_dir,
            config,
        } => run_request(&input, data_dir.as_deref(), config.as_deref()),
        Command::Sweep {
            config,
            grid,
            ticker,
            data_dir,
            rank_by,
            top,
            output,
        } => run_sweep_command(
            &config,
            grid,
            ticker.as_deref(),
            data_dir.as_deref(),
            rank_by,
            top,
            output.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Info {
            ticker,
            data_dir,
            config,
        } => run_info(ticker.as_deref(), data_dir.as_deref(), config.as_deref()),
        Command::ListTickers { data_dir, config } => {
            run_list_tickers(data_dir.as_deref(), config.as_deref())
        }
    }
}

fn fail(err: &BacktestError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    read_backtest_config(adapter)
}

/// Request from the `[backtest]` and `[strategy]` sections, with an optional
/// ticker taking precedence over the configured one.
pub fn build_request(
    adapter: &dyn ConfigPort,
    ticker_override: Option<&str>,
) -> Result<BacktestRequest, BacktestError> {
    let ticker = ticker_override
        .map(str::to_string)
        .or_else(|| read_ticker(adapter))
        .ok_or_else(|| BacktestError::ConfigMissing {
            section: "backtest".into(),
            key: "ticker".into(),
        })?;
    let (strategy, parameters) = read_strategy_params(adapter)?;
    Ok(BacktestRequest {
        ticker,
        strategy,
        parameters,
        initial_capital: None,
        date_range: read_date_range(adapter)?,
    })
}

/// `--data-dir` wins over `[data] directory`.
pub fn resolve_data_dir(
    override_dir: Option<&Path>,
    config: Option<&dyn ConfigPort>,
) -> Result<PathBuf, BacktestError> {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| config.and_then(read_data_directory).map(PathBuf::from))
        .ok_or_else(|| BacktestError::ConfigMissing {
            section: DATA.into(),
            key: "directory".into(),
        })
}

fn run_backtest(
    config_path: &Path,
    ticker: Option<&str>,
    data_dir: Option<&Path>,
    output: &str,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let prepared = build_backtest_config(&adapter).and_then(|config| {
        let request = build_request(&adapter, ticker)?;
        let dir = resolve_data_dir(data_dir, Some(&adapter))?;
        Ok((config, request, dir))
    });
    let (bt_config, request, dir) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    eprintln!(
        "Running {} on {} (data: {})",
        request.strategy,
        request.ticker,
        dir.display()
    );
    let data_port = CsvAdapter::new(dir);
    let evaluation = match engine::evaluate_request(&data_port, &request, &bt_config) {
        Ok(e) => e,
        Err(e) => return fail(&e),
    };

    print_summary(&evaluation);

    match JsonReportAdapter::new().write(&evaluation.result, output) {
        Ok(()) => {
            if output != STDOUT_PATH {
                eprintln!("\nReport written to: {output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

pub fn print_summary(evaluation: &Evaluation) {
    let result = &evaluation.result;
    let m: &Metrics = &evaluation.metrics;

    eprintln!("\n=== {} / {} ===", result.ticker, result.strategy);
    if let (Some(first), Some(last)) = (result.equity_curve.first(), result.equity_curve.last()) {
        eprintln!("Period:           {} to {}", first.date, last.date);
        eprintln!("Final Equity:     {:.2}", last.equity);
    }
    eprintln!("Total Return:     {:.2}%", m.total_return);
    eprintln!("Annualized:       {:.2}%", m.annualized_return);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!(
        "Max Drawdown:     {:.1}% ({} bars)",
        m.max_drawdown, m.max_drawdown_duration
    );
    eprintln!(
        "Total Trades:     {} ({} won, {} lost, {} even)",
        m.total_trades, m.trades_won, m.trades_lost, m.trades_breakeven
    );
    eprintln!("Win Rate:         {:.1}%", m.win_rate);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    if m.total_trades > 0 {
        eprintln!("Avg Win / Loss:   {:.2} / {:.2}", m.avg_win, m.avg_loss);
        eprintln!("Largest W / L:    {:.2} / {:.2}", m.largest_win, m.largest_loss);
        eprintln!("Avg Holding:      {:.1} days", m.avg_holding_days);
    }
}

fn read_input(input: &str) -> io::Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(input)
    }
}

fn print_error_body(err: &BacktestError) -> ExitCode {
    let body = ErrorResponse::from(err);
    match serde_json::to_string_pretty(&body) {
        Ok(json) => println!("{json}"),
        Err(_) => eprintln!("error: {err}"),
    }
    err.into()
}

fn run_request(input: &str, data_dir: Option<&Path>, config_path: Option<&Path>) -> ExitCode {
    let adapter = match config_path.map(FileConfigAdapter::from_file).transpose() {
        Ok(a) => a,
        Err(e) => return print_error_body(&e),
    };
    let config_port = adapter.as_ref().map(|a| a as &dyn ConfigPort);

    let bt_config = match config_port.map(build_backtest_config).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(e) => return print_error_body(&e),
    };

    let text = match read_input(input) {
        Ok(t) => t,
        Err(e) => return print_error_body(&BacktestError::Io(e)),
    };
    let request: BacktestRequest = match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            return print_error_body(&BacktestError::ConfigParse {
                file: input.to_string(),
                reason: e.to_string(),
            });
        }
    };

    // Reject bad requests before the data directory matters.
    if let Err(e) = engine::resolve_request(&request, &bt_config) {
        return print_error_body(&e);
    }
    let dir = match resolve_data_dir(data_dir, config_port) {
        Ok(d) => d,
        Err(e) => return print_error_body(&e),
    };

    let data_port = CsvAdapter::new(dir);
    match engine::run_request(&data_port, &request, &bt_config) {
        Ok(result) => match JsonReportAdapter::new().write(&result, STDOUT_PATH) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(&e),
        },
        Err(e) => print_error_body(&e),
    }
}

fn run_sweep_command(
    config_path: &Path,
    axes: Vec<(String, Vec<f64>)>,
    ticker: Option<&str>,
    data_dir: Option<&Path>,
    rank_by: RankBy,
    top: usize,
    output: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let grid = axes
        .into_iter()
        .fold(ParameterGrid::new(), |grid, (key, values)| grid.axis(key, values));

    let report = build_backtest_config(&adapter).and_then(|bt_config| {
        let request = build_request(&adapter, ticker)?;
        let resolved = engine::resolve_request(&request, &bt_config)?;
        let dir = resolve_data_dir(data_dir, Some(&adapter))?;

        eprintln!(
            "Sweeping {} on {}: {} combinations",
            request.strategy,
            resolved.ticker,
            grid.len()
        );
        let data_port = CsvAdapter::new(dir);
        let series = engine::load_series(&data_port, &resolved.ticker, resolved.date_range)?;
        run_sweep(&series, &request.strategy, &request.parameters, &grid, &bt_config)
    });
    let report = match report {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_leaderboard(&report, rank_by, top);

    if let Some(path) = output {
        let written = serde_json::to_string_pretty(&report)
            .map_err(io::Error::from)
            .and_then(|json| fs::write(path, json + "\n"));
        if let Err(e) = written {
            return fail(&BacktestError::Io(e));
        }
        eprintln!("\nSweep report written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn print_leaderboard(report: &SweepReport, rank_by: RankBy, top: usize) {
    let ranked = report.ranked(rank_by);
    eprintln!(
        "\n=== Top {} by {} ({} completed, {} failed) ===",
        top.min(ranked.len()),
        rank_by,
        ranked.len(),
        report.failures()
    );
    for (rank, entry) in ranked.iter().take(top).enumerate() {
        let Some(m) = entry.metrics() else { continue };
        let params: Vec<String> = entry
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        eprintln!(
            "{:>3}. {:<32} return {:>8.2}%  sharpe {:>6.2}  dd {:>7.2}%  trades {:>4}  win {:>5.1}%",
            rank + 1,
            params.join(" "),
            m.total_return,
            m.sharpe_ratio,
            m.max_drawdown,
            m.total_trades,
            m.win_rate,
        );
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let validated = match validate_config(&adapter) {
        Ok(v) => v,
        Err(e) => return fail(&e),
    };

    let bt = &validated.backtest;
    eprintln!("\nStrategy:");
    eprintln!("  {}", validated.strategy);
    eprintln!("  minimum bars: {}", validated.strategy.min_bars());
    let indicators: Vec<String> = validated
        .strategy
        .required_indicators()
        .iter()
        .map(|i| i.to_string())
        .collect();
    eprintln!("  indicators:   {}", indicators.join(", "));

    eprintln!("\nBacktest:");
    eprintln!("  initial capital:  {:.2}", bt.initial_capital);
    eprintln!("  position size:    {}", bt.position_size);
    eprintln!(
        "  commission:       {} + {}%",
        bt.commission_per_trade, bt.commission_pct
    );
    eprintln!("  slippage:         {}%", bt.slippage_pct);
    eprintln!("  liquidate at end: {}", bt.liquidate_at_end);
    if let Some(range) = validated.date_range {
        eprintln!("  date range:       {} to {}", range.start, range.end);
    }
    if let Some(ticker) = read_ticker(&adapter) {
        eprintln!("  ticker:           {ticker}");
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn open_data_port(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<CsvAdapter, ExitCode> {
    let adapter = config_path.map(load_config).transpose()?;
    resolve_data_dir(data_dir, adapter.as_ref().map(|a| a as &dyn ConfigPort))
        .map(CsvAdapter::new)
        .map_err(|e| fail(&e))
}

fn run_info(ticker: Option<&str>, data_dir: Option<&Path>, config_path: Option<&Path>) -> ExitCode {
    let data_port = match open_data_port(data_dir, config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => match data_port.list_tickers() {
            Ok(t) => t,
            Err(e) => return fail(&e),
        },
    };

    for t in &tickers {
        match data_port.get_data_range(t) {
            Ok(Some((first, last, count))) => println!("{t}: {count} bars, {first} to {last}"),
            Ok(None) => eprintln!("{t}: no data found"),
            Err(e) => eprintln!("error querying {t}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

fn run_list_tickers(data_dir: Option<&Path>, config_path: Option<&Path>) -> ExitCode {
    let data_port = match open_data_port(data_dir, config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    match data_port.list_tickers() {
        Ok(tickers) if tickers.is_empty() => {
            eprintln!("No tickers found");
            ExitCode::SUCCESS
        }
        Ok(tickers) => {
            for t in &tickers {
                println!("{t}");
            }
            eprintln!(
                "{} tickers found (strategies: {})",
                tickers.len(),
                STRATEGY_NAMES.join(", ")
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
