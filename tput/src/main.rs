//! Storage throughput measurement CLI.
#![forbid(unsafe_code)]

mod output;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tput_core::{
    IoMode, LogConfig, MeasureConfig, SessionSummary, SyntheticProfile, compare, init_logging,
    measure,
};
use tracing::warn;

use crate::output::{OutputFormat, Printer};

#[derive(Parser, Debug)]
#[command(
    name = "tput",
    version,
    about = "Measure sustained storage throughput until the mean is stable",
    long_about = "Repeatedly reads or writes one block with a durability barrier \
                  after each transfer and reports the running mean throughput. \
                  Sampling stops once the standard error of the mean drops below \
                  --stdev-percent of the mean or --count samples were taken.\n\n\
                  TARGET may be a directory (an anonymous temporary file is used), \
                  an existing file or block device, or a new path that is created \
                  and removed again. With a second target both are measured and \
                  the change from the first to the second is reported."
)]
struct Cli {
    /// Directory, file or block device to measure
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Second target, compared against the first
    compare_target: Option<PathBuf>,

    /// Size of each synced block in KiB
    #[arg(
        long,
        default_value_t = 128 * 1024,
        env = "TPUT_SIZE",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    size: u64,

    /// Maximum number of samples; 0 samples until the mean is stable
    #[arg(long, default_value_t = 10, env = "TPUT_COUNT")]
    count: u64,

    /// Stop once the standard error is below this percentage of the mean
    #[arg(long, default_value_t = 10.0, env = "TPUT_STDEV_PERCENT")]
    stdev_percent: f64,

    /// Number of concurrent worker threads; 0 runs a single inline worker
    #[arg(long, default_value_t = 0, env = "TPUT_THREADS")]
    threads: usize,

    /// Measure writes instead of reads
    #[arg(long, env = "TPUT_WRITE")]
    write: bool,

    /// Only print the final result
    #[arg(short, long, env = "TPUT_QUIET")]
    quiet: bool,

    /// Print bare numbers (KiB/s and percent) for scripts
    #[arg(long, env = "TPUT_BATCH", conflicts_with = "json")]
    batch: bool,

    /// Print the final result as JSON
    #[arg(long, env = "TPUT_JSON")]
    json: bool,

    /// Use a synthetic Gaussian sampler (100 MiB/s, 10 MiB/s spread) instead of the target
    #[arg(long, env = "TPUT_SELFTEST")]
    selftest: bool,

    /// Seed for the synthetic sampler
    #[arg(long, requires = "selftest", env = "TPUT_SEED")]
    seed: Option<u64>,

    /// Never open targets with O_DIRECT
    #[arg(long, env = "TPUT_BUFFERED")]
    buffered: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn measure_config(&self) -> MeasureConfig {
        let mode = if self.write {
            IoMode::Write
        } else {
            IoMode::Read
        };
        let mut config = MeasureConfig::new()
            .with_block_size_kib(self.size)
            .with_count(self.count)
            .with_stdev_percent(self.stdev_percent)
            .with_threads(self.threads)
            .with_mode(mode)
            .with_direct_io(!self.buffered);
        if self.selftest {
            let profile = SyntheticProfile::default();
            config = config.with_selftest(match self.seed {
                Some(seed) => profile.with_seed(seed),
                None => profile,
            });
        }
        config
    }

    fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.batch {
            OutputFormat::Batch
        } else {
            OutputFormat::Human
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = cli.measure_config();
    let printer = Printer::new(
        io::stdout(),
        cli.output_format(),
        cli.quiet,
        cli.selftest,
    );

    let first = run(&printer, &cli.target, &config)?;
    let Some(second_target) = &cli.compare_target else {
        printer.summary(&first)?;
        return Ok(());
    };

    printer.separator()?;
    let second = run(&printer, second_target, &config)?;

    match compare(&first, &second) {
        Ok(comparison) => printer.comparison(&first, &second, &comparison)?,
        Err(e) if !e.is_fatal() => {
            warn!(error = %e, "Comparison skipped");
            eprintln!("tput: cannot compare runs: {e}");
            printer.uncompared(&first, &second)?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn run(
    printer: &Printer<io::Stdout>,
    target: &Path,
    config: &MeasureConfig,
) -> Result<SessionSummary> {
    let summary = measure(target, config, printer)
        .with_context(|| format!("measuring {}", target.display()))?;
    printer.session_end(&summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["tput"]).unwrap();
        assert_eq!(cli.target, PathBuf::from("."));
        assert!(cli.compare_target.is_none());
        assert_eq!(cli.output_format(), OutputFormat::Human);

        let config = cli.measure_config();
        assert_eq!(config.block_size, 128 * 1024 * 1024);
        assert_eq!(config.count, 10);
        assert_eq!(config.stdev_percent, 10.0);
        assert_eq!(config.threads, 0);
        assert_eq!(config.mode, IoMode::Read);
        assert!(config.direct_io);
        assert!(config.selftest.is_none());
    }

    #[test]
    fn test_full_option_set() {
        let cli = Cli::try_parse_from([
            "tput",
            "--size",
            "4",
            "--count",
            "0",
            "--stdev-percent",
            "2.5",
            "--threads",
            "4",
            "--write",
            "--buffered",
            "--batch",
            "/mnt/a",
            "/mnt/b",
        ])
        .unwrap();
        assert_eq!(cli.target, PathBuf::from("/mnt/a"));
        assert_eq!(cli.compare_target, Some(PathBuf::from("/mnt/b")));
        assert_eq!(cli.output_format(), OutputFormat::Batch);

        let config = cli.measure_config();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.count, 0);
        assert_eq!(config.stdev_percent, 2.5);
        assert_eq!(config.threads, 4);
        assert_eq!(config.mode, IoMode::Write);
        assert!(!config.direct_io);
    }

    #[test]
    fn test_selftest_with_seed() {
        let cli = Cli::try_parse_from(["tput", "--selftest", "--seed", "7"]).unwrap();
        let profile = cli.measure_config().selftest.unwrap();
        assert_eq!(profile.seed, Some(7));
        assert_eq!(profile.mean_throughput, 100.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["tput", "--size", "0"]).is_err());
        assert!(Cli::try_parse_from(["tput", "--count", "-1"]).is_err());
        assert!(Cli::try_parse_from(["tput", "--batch", "--json"]).is_err());
        assert!(Cli::try_parse_from(["tput", "--seed", "1"]).is_err());
        assert!(Cli::try_parse_from(["tput", "a", "b", "c"]).is_err());
    }
}
