//! JSON report adapter.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::domain::engine::BacktestResult;
use crate::domain::error::BacktestError;
use crate::ports::report_port::ReportPort;

/// Path that sends the report to stdout instead of a file.
pub const STDOUT_PATH: &str = "-";

/// Writes a [`BacktestResult`] as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    fn write_to<W: Write>(&self, result: &BacktestResult, writer: W) -> Result<(), BacktestError> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, result).map_err(io::Error::from)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), BacktestError> {
        if output_path == STDOUT_PATH {
            return self.write_to(result, io::stdout().lock());
        }
        self.write_to(result, File::create(output_path)?)
    }
}
