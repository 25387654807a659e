//! Adaptive stopping policy.
//!
//! Decides after every completed sample whether the running estimate is
//! stable enough to stop. The decision is a pure function of the sample
//! index, the relative standard error, the sample-count cap and the
//! threshold, so it needs no state of its own.

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one completed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// First sample; uncertainty cannot be bounded yet.
    Warmup,
    /// Keep sampling.
    Sampling,
    /// Threshold met at or after the cap.
    Converged,
    /// Cap reached without meeting the threshold, or cap of one.
    Forced,
}

impl Verdict {
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Converged | Self::Forced)
    }
}

/// Stopping rule parameterised by sample-count cap and threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceController {
    cap: u64,
    threshold_percent: f64,
}

impl ConvergenceController {
    /// `cap` of 0 means unbounded; `threshold_percent` is the largest
    /// acceptable relative standard error, in percent of the mean.
    pub fn new(cap: u64, threshold_percent: f64) -> Self {
        Self {
            cap,
            threshold_percent,
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Evaluate the sample with 0-based `index`.
    ///
    /// `relative_stderr` is `100 * stderr / mean`, or `None` while it is
    /// undefined (fewer than two samples, or a zero mean).
    pub fn evaluate(&self, index: u64, relative_stderr: Option<f64>) -> Verdict {
        if self.cap == 1 {
            return Verdict::Forced;
        }
        if index == 0 {
            return Verdict::Warmup;
        }

        let within = relative_stderr.is_some_and(|rel| rel <= self.threshold_percent);
        if self.cap == 0 {
            return if within {
                Verdict::Converged
            } else {
                Verdict::Sampling
            };
        }

        if index.saturating_add(1) < self.cap {
            Verdict::Sampling
        } else if within {
            Verdict::Converged
        } else {
            Verdict::Forced
        }
    }
}

/// `100 * stderr / mean`, undefined for a missing stderr or a zero mean.
pub fn relative_stderr_percent(stderr: Option<f64>, mean: f64) -> Option<f64> {
    let stderr = stderr?;
    (mean != 0.0 && mean.is_finite()).then(|| 100.0 * stderr / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_of_one_stops_after_first_sample() {
        let ctl = ConvergenceController::new(1, 10.0);
        assert_eq!(ctl.evaluate(0, None), Verdict::Forced);
    }

    #[test]
    fn test_first_sample_never_stops() {
        for cap in [0, 2, 10, 1000] {
            let ctl = ConvergenceController::new(cap, 100.0);
            let verdict = ctl.evaluate(0, Some(0.0));
            assert_eq!(verdict, Verdict::Warmup, "cap {cap}");
            assert!(!verdict.is_stop());
        }
    }

    #[test]
    fn test_cap_is_a_minimum_even_when_converged() {
        let ctl = ConvergenceController::new(10, 10.0);
        for index in 1..9 {
            assert_eq!(ctl.evaluate(index, Some(0.5)), Verdict::Sampling);
        }
        assert_eq!(ctl.evaluate(9, Some(0.5)), Verdict::Converged);
    }

    #[test]
    fn test_cap_is_a_ceiling_when_not_converged() {
        let ctl = ConvergenceController::new(10, 10.0);
        assert_eq!(ctl.evaluate(8, Some(25.0)), Verdict::Sampling);
        assert_eq!(ctl.evaluate(9, Some(25.0)), Verdict::Forced);
        assert_eq!(ctl.evaluate(9, None), Verdict::Forced);
    }

    #[test]
    fn test_extra_samples_past_cap_still_stop() {
        // Concurrent workers may finish samples after the cap was hit.
        let ctl = ConvergenceController::new(4, 10.0);
        assert!(ctl.evaluate(5, Some(50.0)).is_stop());
        assert!(ctl.evaluate(6, Some(1.0)).is_stop());
    }

    #[test]
    fn test_unbounded_runs_until_threshold() {
        let ctl = ConvergenceController::new(0, 5.0);
        assert_eq!(ctl.evaluate(1, Some(30.0)), Verdict::Sampling);
        assert_eq!(ctl.evaluate(10_000, Some(5.01)), Verdict::Sampling);
        assert_eq!(ctl.evaluate(10_001, Some(5.0)), Verdict::Converged);
    }

    #[test]
    fn test_undefined_stderr_never_converges_unbounded() {
        let ctl = ConvergenceController::new(0, 100.0);
        assert_eq!(ctl.evaluate(3, None), Verdict::Sampling);
    }

    #[test]
    fn test_relative_stderr_percent() {
        assert_eq!(relative_stderr_percent(Some(5.0), 100.0), Some(5.0));
        assert_eq!(relative_stderr_percent(None, 100.0), None);
        assert_eq!(relative_stderr_percent(Some(5.0), 0.0), None);
    }

    #[test]
    fn test_never_stops_before_index_one_unless_cap_one() {
        for cap in 0..50 {
            let ctl = ConvergenceController::new(cap, 1e9);
            let stops = ctl.evaluate(0, Some(0.0)).is_stop();
            assert_eq!(stops, cap == 1, "cap {cap}");
        }
    }
}
