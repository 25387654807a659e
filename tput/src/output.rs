//! Result formatting.
//!
//! Human output auto-scales throughput with binary units; batch output
//! prints bare numbers (KiB/s and whole percents) one per line for
//! scripts; JSON output prints only the final report.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tput_core::{ComparisonResult, ProgressSink, SampleProgress, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Batch,
    Json,
}

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format bytes per second with a binary unit, e.g. `97.7 MiB/s`.
pub fn format_throughput(bytes_per_sec: f64) -> String {
    let sign = if bytes_per_sec < 0.0 { "-" } else { "" };
    let mut value = bytes_per_sec.abs();
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{sign}{value:.0} {}/s", UNITS[unit])
    } else {
        format!("{sign}{value:.1} {}/s", UNITS[unit])
    }
}

fn kib(bytes_per_sec: f64) -> String {
    format!("{:.0}", bytes_per_sec / 1024.0)
}

#[derive(Serialize)]
struct ComparisonReport<'a> {
    baseline: &'a SessionSummary,
    candidate: &'a SessionSummary,
    /// `null` when the runs could not be compared.
    comparison: Option<&'a ComparisonResult>,
}

/// Prints progress and results; shared by all workers of a run.
pub struct Printer<W> {
    out: Mutex<W>,
    format: OutputFormat,
    quiet: bool,
    selftest: bool,
}

impl<W: Write + Send> Printer<W> {
    pub fn new(out: W, format: OutputFormat, quiet: bool, selftest: bool) -> Self {
        Self {
            out: Mutex::new(out),
            format,
            quiet,
            selftest,
        }
    }

    fn write_with<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut W) -> io::Result<()>,
    {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut out)?;
        out.flush()
    }

    fn throughput_line(&self, out: &mut W, name: &str, value: f64) -> io::Result<()> {
        match self.format {
            OutputFormat::Batch => writeln!(out, "{}", kib(value)),
            _ => writeln!(out, "{name} = {}", format_throughput(value)),
        }
    }

    fn percent_line(&self, out: &mut W, name: &str, value: f64) -> io::Result<()> {
        match self.format {
            OutputFormat::Batch => writeln!(out, "{value:.0}"),
            _ => writeln!(out, "{name}={value:.0} %"),
        }
    }

    fn mean_lines(&self, out: &mut W, mean: f64, relative_stderr: Option<f64>) -> io::Result<()> {
        self.throughput_line(out, "mean", mean)?;
        if let Some(rel) = relative_stderr {
            self.percent_line(out, "mean_stdev", rel)?;
        }
        Ok(())
    }

    /// End-of-run lines that follow every session.
    pub fn session_end(&self, summary: &SessionSummary) -> io::Result<()> {
        if !self.selftest || self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }
        match summary.stdev {
            Some(sd) => self.write_with(|out| self.throughput_line(out, "stdev", sd)),
            None => Ok(()),
        }
    }

    /// Blank line between the two runs of a comparison.
    pub fn separator(&self) -> io::Result<()> {
        if self.quiet || self.format == OutputFormat::Json {
            return Ok(());
        }
        self.write_with(|out| writeln!(out))
    }

    /// Final result of a single-target run.
    pub fn summary(&self, summary: &SessionSummary) -> io::Result<()> {
        self.write_with(|out| match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, summary)?;
                writeln!(out)
            }
            _ => self.mean_lines(out, summary.mean, summary.relative_stderr()),
        })
    }

    /// Final result of a two-target run.
    pub fn comparison(
        &self,
        baseline: &SessionSummary,
        candidate: &SessionSummary,
        comparison: &ComparisonResult,
    ) -> io::Result<()> {
        self.write_with(|out| {
            if self.format == OutputFormat::Json {
                return write_report(out, baseline, candidate, Some(comparison));
            }

            self.throughput_line(out, "delta", comparison.delta)?;
            self.throughput_line(out, "delta_stdev", comparison.delta_stdev)?;
            self.percent_line(out, "change", comparison.percent_change)?;
            self.percent_line(out, "change_stdev", comparison.percent_change_stdev)?;
            match self.format {
                OutputFormat::Batch => {
                    writeln!(out, "{:.0}", comparison.percent_change_low)?;
                    writeln!(out, "{:.0}", comparison.percent_change_high)
                }
                _ => writeln!(
                    out,
                    "change_range=[{:.0}, {:.0}] %",
                    comparison.percent_change_low, comparison.percent_change_high
                ),
            }
        })
    }

    /// Two-target run whose comparison was declined. Only JSON output
    /// reports anything, so the measured summaries are not lost.
    pub fn uncompared(
        &self,
        baseline: &SessionSummary,
        candidate: &SessionSummary,
    ) -> io::Result<()> {
        if self.format != OutputFormat::Json {
            return Ok(());
        }
        self.write_with(|out| write_report(out, baseline, candidate, None))
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_report<W: Write>(
    out: &mut W,
    baseline: &SessionSummary,
    candidate: &SessionSummary,
    comparison: Option<&ComparisonResult>,
) -> io::Result<()> {
    let report = ComparisonReport {
        baseline,
        candidate,
        comparison,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

impl<W: Write + Send> ProgressSink for Printer<W> {
    fn on_sample(&self, progress: &SampleProgress) {
        if self.quiet || self.format == OutputFormat::Json {
            return;
        }
        // Progress output is best effort; a closed stdout must not stop
        // the measurement.
        let _ = self.write_with(|out| {
            self.throughput_line(out, "cur", progress.current)?;
            if progress.index == 0 {
                return Ok(());
            }
            self.mean_lines(out, progress.mean, progress.relative_stderr)
        });
    }
}
