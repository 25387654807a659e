//! Immutable measurement configuration.

use serde::{Deserialize, Serialize};

use crate::convergence::ConvergenceController;
use crate::error::MeasureError;

const MIB: f64 = 1024.0 * 1024.0;

/// Direction of the timed I/O operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    #[default]
    Read,
    Write,
}

impl IoMode {
    pub fn op_name(self) -> &'static str {
        match self {
            Self::Read => "pread",
            Self::Write => "pwrite",
        }
    }
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Parameters of the Gaussian synthetic sampler used for self-tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticProfile {
    /// Mean throughput in bytes per second.
    pub mean_throughput: f64,
    /// Standard deviation of throughput in bytes per second.
    pub stdev_throughput: f64,
    /// Fixed RNG seed; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            mean_throughput: 100.0 * MIB,
            stdev_throughput: 10.0 * MIB,
            seed: None,
        }
    }
}

impl SyntheticProfile {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Everything a measurement session needs to know, fixed for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureConfig {
    /// Bytes per timed operation.
    pub block_size: u64,
    /// Sample-count cap; 0 = unbounded.
    pub count: u64,
    /// Largest acceptable relative standard error, in percent.
    pub stdev_percent: f64,
    /// Concurrent workers; 0 = one inline worker.
    pub threads: usize,
    pub mode: IoMode,
    /// Bypass the page cache when reading pre-existing targets.
    pub direct_io: bool,
    /// Replace real I/O with synthetic Gaussian samples.
    pub selftest: Option<SyntheticProfile>,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            block_size: 128 * 1024 * 1024, // 128 MiB
            count: 10,
            stdev_percent: 10.0,
            threads: 0,
            mode: IoMode::Read,
            direct_io: true,
            selftest: None,
        }
    }
}

impl MeasureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size in bytes.
    #[must_use]
    pub fn with_block_size(mut self, bytes: u64) -> Self {
        self.block_size = bytes;
        self
    }

    /// Set the block size in KiB.
    #[must_use]
    pub fn with_block_size_kib(self, kib: u64) -> Self {
        self.with_block_size(kib.saturating_mul(1024))
    }

    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_stdev_percent(mut self, percent: f64) -> Self {
        self.stdev_percent = percent;
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: IoMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_direct_io(mut self, direct: bool) -> Self {
        self.direct_io = direct;
        self
    }

    #[must_use]
    pub fn with_selftest(mut self, profile: SyntheticProfile) -> Self {
        self.selftest = Some(profile);
        self
    }

    /// Number of workers actually spawned (at least one).
    pub fn worker_count(&self) -> usize {
        self.threads.max(1)
    }

    /// Block size as an in-memory length.
    pub fn block_len(&self) -> Result<usize, MeasureError> {
        usize::try_from(self.block_size).map_err(|_| {
            MeasureError::InvalidConfig(format!(
                "block size {} does not fit in memory",
                self.block_size
            ))
        })
    }

    pub fn controller(&self) -> ConvergenceController {
        ConvergenceController::new(self.count, self.stdev_percent)
    }

    /// Reject values the sampling loop cannot work with.
    pub fn validate(&self) -> Result<(), MeasureError> {
        if self.block_size == 0 {
            return Err(MeasureError::InvalidConfig(
                "block size must be positive".to_string(),
            ));
        }
        self.block_len()?;
        if !self.stdev_percent.is_finite() || self.stdev_percent < 0.0 {
            return Err(MeasureError::InvalidConfig(format!(
                "stdev percent must be a non-negative number, got {}",
                self.stdev_percent
            )));
        }
        if let Some(profile) = &self.selftest {
            if !(profile.mean_throughput.is_finite() && profile.mean_throughput > 0.0) {
                return Err(MeasureError::InvalidConfig(format!(
                    "synthetic mean throughput must be positive, got {}",
                    profile.mean_throughput
                )));
            }
            if !(profile.stdev_throughput.is_finite() && profile.stdev_throughput >= 0.0) {
                return Err(MeasureError::InvalidConfig(format!(
                    "synthetic throughput spread must be non-negative, got {}",
                    profile.stdev_throughput
                )));
            }
        }
        Ok(())
    }
}
