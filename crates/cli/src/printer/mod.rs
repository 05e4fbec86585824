use std::io::{self, Write};

use sluice_pipeline::LoadReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary lines.
    #[default]
    Human,
    /// One JSON object, for machine consumption.
    Json,
}

/// Writer-parameterized report printer, so tests can capture output.
pub struct ReportPrinter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ReportPrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn print(&mut self, report: &LoadReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Human => self.print_human(report),
            OutputFormat::Json => self.print_json(report),
        }
    }

    fn print_human(&mut self, report: &LoadReport) -> io::Result<()> {
        writeln!(self.out, "batches:     {}", report.batches)?;
        writeln!(self.out, "accepted:    {}", report.accepted)?;
        writeln!(self.out, "rejected:    {}", report.rejected)?;
        writeln!(self.out, "inserted:    {}", report.inserted)?;
        writeln!(self.out, "duplicates:  {}", report.duplicates)?;
        writeln!(self.out, "unprocessed: {}", report.unprocessed)?;

        if let Some(err) = &report.source_error {
            writeln!(self.out, "source error: {err}")?;
        }

        for worker in &report.workers {
            match &worker.error {
                Some(err) => writeln!(
                    self.out,
                    "worker {}: {} batches, {} inserted, {} duplicates, FAILED: {err}",
                    worker.worker_id, worker.batches, worker.inserted, worker.duplicates
                )?,
                None => writeln!(
                    self.out,
                    "worker {}: {} batches, {} inserted, {} duplicates",
                    worker.worker_id, worker.batches, worker.inserted, worker.duplicates
                )?,
            }
        }

        writeln!(
            self.out,
            "status:      {}",
            if report.success() { "ok" } else { "FAILED" }
        )
    }

    fn print_json(&mut self, report: &LoadReport) -> io::Result<()> {
        let line = serde_json::to_string(report).map_err(io::Error::other)?;
        writeln!(self.out, "{line}")
    }
}

pub fn print_report(report: &LoadReport, format: OutputFormat) -> io::Result<()> {
    ReportPrinter::new(io::stdout().lock(), format).print(report)
}

#[cfg(test)]
#[path = "printer_tests.rs"]
mod tests;
