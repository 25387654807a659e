//! Online throughput statistics.
//!
//! Single-pass, constant-memory accumulation of per-sample throughput
//! using Welford's update, so long runs do not lose precision the way a
//! running sum of squares does.

use serde::{Deserialize, Serialize};

/// Running statistics over a stream of timed samples.
///
/// Each sample contributes one throughput value (`bytes / elapsed`) to the
/// mean/variance estimate, and its elapsed time and byte count to the
/// cumulative totals used for aggregate throughput.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStatistics {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    total_elapsed: f64,
    total_bytes: f64,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample of `bytes` moved in `elapsed_secs`.
    ///
    /// Returns the sample's instantaneous throughput in bytes per second.
    pub fn add_sample(&mut self, bytes: u64, elapsed_secs: f64) -> f64 {
        let throughput = bytes as f64 / elapsed_secs;
        self.total_elapsed += elapsed_secs;
        self.total_bytes += bytes as f64;
        self.add(throughput);
        throughput
    }

    /// Add one throughput value to the mean/variance estimate.
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean of the per-sample throughput values.
    pub fn mean(&self) -> Option<f64> {
        (self.count >= 1).then_some(self.mean)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count >= 1).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count >= 1).then_some(self.max)
    }

    /// Unbiased sample variance (n - 1 denominator).
    pub fn variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.m2 / (self.count - 1) as f64)
    }

    pub fn standard_deviation(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Standard deviation of the mean estimate, `sd / sqrt(n)`.
    ///
    /// `None` until two samples have been recorded.
    pub fn standard_error_of_mean(&self) -> Option<f64> {
        self.standard_deviation()
            .map(|sd| sd / (self.count as f64).sqrt())
    }

    /// Sum of all recorded elapsed times, in seconds.
    pub fn total_elapsed(&self) -> f64 {
        self.total_elapsed
    }

    /// Total bytes over total elapsed time.
    ///
    /// Unlike [`Self::mean`], this weights each sample by its duration,
    /// which is what a single stream of back-to-back operations observes.
    pub fn aggregate_throughput(&self) -> Option<f64> {
        (self.count >= 1 && self.total_elapsed > 0.0).then(|| self.total_bytes / self.total_elapsed)
    }
}
