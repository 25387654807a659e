//! Measurement error classification.
//!
//! Provides a single error type for everything that can stop a throughput
//! run, and exposes whether a failure aborts the whole run or only
//! declines a derived computation (such as a comparison).

use std::io;
use std::path::PathBuf;

/// Errors that can occur while measuring or comparing throughput.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("{op} transferred {actual} of {expected} bytes")]
    ShortTransfer {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("cannot open target {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot lock block device {} for writing: {source}", path.display())]
    DeviceLock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot allocate {size} byte I/O buffer")]
    Allocation { size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("standard error of {which} is undefined (fewer than two samples)")]
    UndefinedStdev { which: &'static str },

    #[error("baseline mean is zero, percent change is undefined")]
    ZeroBaseline,

    #[error("measurement worker panicked")]
    WorkerPanicked,
}

impl MeasureError {
    /// Whether this error terminates the whole run.
    ///
    /// Comparison errors only decline to produce a report; the measured
    /// summaries are still valid.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UndefinedStdev { .. } | Self::ZeroBaseline)
    }

    /// Whether this error means the measured data cannot be trusted.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::ShortTransfer { .. })
    }

    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        Self::Io { op, source }
    }
}
