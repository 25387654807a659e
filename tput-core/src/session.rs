//! Shared state of one target's measurement run.
//!
//! Every worker runs [`MeasurementSession::run_worker`]. The timed I/O
//! happens outside the session lock; the statistics update, the stopping
//! decision and progress reporting for each completed sample happen under
//! it, so they observe a strict total order of sample arrivals.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{IoMode, MeasureConfig};
use crate::convergence::{ConvergenceController, Verdict, relative_stderr_percent};
use crate::error::MeasureError;
use crate::runner::SampleRunner;
use crate::stats::RunningStatistics;

/// Snapshot published after each completed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleProgress {
    /// 0-based index across all workers.
    pub index: u64,
    /// Worker that produced the sample.
    pub worker: usize,
    /// Instantaneous throughput of this sample, bytes/s.
    pub current: f64,
    /// Aggregate throughput so far, scaled by worker count, bytes/s.
    pub mean: f64,
    /// Standard error of the mean per-sample throughput, not scaled by
    /// worker count; `None` below two samples.
    pub mean_stdev: Option<f64>,
    /// `100 * mean_stdev / mean`.
    pub relative_stderr: Option<f64>,
    pub verdict: Verdict,
}

/// Receives progress from inside the session lock.
///
/// Calls are serialised, so implementations can print without their
/// lines interleaving.
pub trait ProgressSink: Sync {
    fn on_sample(&self, progress: &SampleProgress);
}

impl ProgressSink for () {
    fn on_sample(&self, _progress: &SampleProgress) {}
}

/// Final result of one target's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub target: String,
    pub mode: IoMode,
    pub threads: usize,
    pub block_size: u64,
    pub samples: u64,
    pub total_elapsed_secs: f64,
    /// Aggregate throughput, bytes/s, scaled by worker count.
    pub mean: f64,
    /// Standard error of the mean per-sample throughput, unscaled;
    /// `None` if fewer than two samples.
    pub mean_stdev: Option<f64>,
    /// Smallest per-sample throughput, bytes/s.
    pub min: Option<f64>,
    /// Largest per-sample throughput, bytes/s.
    pub max: Option<f64>,
    /// Sample standard deviation of per-sample throughput, bytes/s.
    pub stdev: Option<f64>,
    /// Verdict that stopped the run.
    pub stop_reason: Option<Verdict>,
    pub timestamp: DateTime<Utc>,
}

impl SessionSummary {
    pub fn relative_stderr(&self) -> Option<f64> {
        relative_stderr_percent(self.mean_stdev, self.mean)
    }
}

#[derive(Debug, Default)]
struct SharedState {
    next_index: u64,
    stats: RunningStatistics,
    mean: f64,
    mean_stdev: Option<f64>,
    done: bool,
    stop_reason: Option<Verdict>,
}

/// One target's run, shared by reference across its workers.
pub struct MeasurementSession<'a, R> {
    runner: R,
    controller: ConvergenceController,
    target: String,
    mode: IoMode,
    threads: usize,
    scale: f64,
    state: Mutex<SharedState>,
    sink: &'a dyn ProgressSink,
}

impl<R> std::fmt::Debug for MeasurementSession<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementSession")
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("threads", &self.threads)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl<'a, R: SampleRunner> MeasurementSession<'a, R> {
    pub fn new(
        runner: R,
        target: impl Into<String>,
        config: &MeasureConfig,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            runner,
            controller: config.controller(),
            target: target.into(),
            mode: config.mode,
            threads: config.threads,
            scale: config.worker_count() as f64,
            state: Mutex::new(SharedState::default()),
            sink,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Stop all workers after their current sample.
    pub fn abort(&self) {
        self.lock().done = true;
    }

    /// Fold one completed sample into the shared state and decide whether
    /// the run should stop.
    pub fn record(&self, worker: usize, elapsed_secs: f64) -> SampleProgress {
        let mut state = self.lock();

        let index = state.next_index;
        state.next_index += 1;
        let current = state
            .stats
            .add_sample(self.runner.block_size(), elapsed_secs);

        // Only the mean is scaled by worker count; the stderr stays that of
        // the per-sample throughput.
        let aggregate = state.stats.aggregate_throughput().unwrap_or(0.0);
        state.mean = self.scale * aggregate;
        state.mean_stdev = state.stats.standard_error_of_mean();
        let relative_stderr = relative_stderr_percent(state.mean_stdev, state.mean);

        let verdict = self.controller.evaluate(index, relative_stderr);
        if verdict.is_stop() && !state.done {
            state.done = true;
            state.stop_reason = Some(verdict);
            info!(
                target_path = %self.target,
                samples = index + 1,
                ?verdict,
                relative_stderr,
                "Sampling stopped"
            );
        }

        let progress = SampleProgress {
            index,
            worker,
            current,
            mean: state.mean,
            mean_stdev: state.mean_stdev,
            relative_stderr,
            verdict,
        };
        debug!(
            target_path = %self.target,
            index,
            worker,
            current,
            mean = progress.mean,
            relative_stderr,
            "Sample recorded"
        );
        self.sink.on_sample(&progress);
        progress
    }

    /// Per-worker scratch length the runner needs.
    pub fn scratch_len(&self) -> usize {
        self.runner.scratch_len()
    }

    /// Sampling loop for one worker; returns how many samples it took.
    ///
    /// `scratch` must hold at least [`Self::scratch_len`] bytes. The stop
    /// flag is polled once per iteration, so a worker can finish one more
    /// sample after another worker has signalled stop.
    pub fn run_worker(&self, worker: usize, scratch: &mut [u8]) -> Result<u64, MeasureError> {
        let mut taken = 0;

        while !self.is_done() {
            let elapsed = match self.runner.run_sample(scratch) {
                Ok(elapsed) => elapsed,
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            };
            self.record(worker, elapsed);
            taken += 1;
        }

        Ok(taken)
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.lock();
        SessionSummary {
            target: self.target.clone(),
            mode: self.mode,
            threads: self.threads,
            block_size: self.runner.block_size(),
            samples: state.stats.count(),
            total_elapsed_secs: state.stats.total_elapsed(),
            mean: state.mean,
            mean_stdev: state.mean_stdev,
            min: state.stats.min(),
            max: state.stats.max(),
            stdev: state.stats.standard_deviation(),
            stop_reason: state.stop_reason,
            timestamp: Utc::now(),
        }
    }
}
