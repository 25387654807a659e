//! Adaptive storage throughput measurement.
//!
//! Repeatedly times a durable read or write of one fixed-size block,
//! folds each sample into running statistics, and stops once the standard
//! error of the mean is small enough (or a sample cap is reached). Runs may
//! use several worker threads against the same target, and two runs can
//! be compared with their uncertainties propagated.
#![forbid(unsafe_code)]

pub mod buffer;
pub mod compare;
pub mod config;
pub mod convergence;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod measure;
pub mod runner;
pub mod session;
pub mod stats;
pub mod target;

pub use compare::{ComparisonResult, compare};
pub use config::{IoMode, MeasureConfig, SyntheticProfile};
pub use convergence::{ConvergenceController, Verdict};
pub use error::MeasureError;
pub use logging::{LogConfig, LoggingGuards, init_logging};
pub use measure::measure;
pub use session::{ProgressSink, SampleProgress, SessionSummary};
pub use stats::RunningStatistics;
