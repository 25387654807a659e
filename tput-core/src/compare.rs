//! Two-target comparison with propagated uncertainty.

use serde::{Deserialize, Serialize};

use crate::error::MeasureError;
use crate::session::SessionSummary;

/// Change from a baseline run (a) to a candidate run (b).
///
/// Errors are assumed independent, so standard errors add in quadrature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// `mean_b - mean_a`, bytes/s.
    pub delta: f64,
    /// `sqrt(stdev_a^2 + stdev_b^2)`, bytes/s.
    pub delta_stdev: f64,
    /// `100 * delta / mean_a`.
    pub percent_change: f64,
    /// `100 * delta_stdev / mean_a`.
    pub percent_change_stdev: f64,
    /// Lower bound of the approximate 95% interval on `percent_change`.
    pub percent_change_low: f64,
    /// Upper bound of the approximate 95% interval on `percent_change`.
    pub percent_change_high: f64,
}

impl ComparisonResult {
    /// Compare `(mean, stdev)` pairs. A `None` stdev means the run had
    /// fewer than two samples, which makes the comparison meaningless.
    pub fn from_parts(
        mean_a: f64,
        stdev_a: Option<f64>,
        mean_b: f64,
        stdev_b: Option<f64>,
    ) -> Result<Self, MeasureError> {
        let stdev_a = stdev_a.ok_or(MeasureError::UndefinedStdev { which: "baseline" })?;
        let stdev_b = stdev_b.ok_or(MeasureError::UndefinedStdev { which: "candidate" })?;
        if mean_a == 0.0 {
            return Err(MeasureError::ZeroBaseline);
        }

        let delta = mean_b - mean_a;
        let delta_stdev = stdev_a.hypot(stdev_b);
        let percent_change = 100.0 * delta / mean_a;
        let percent_change_stdev = 100.0 * delta_stdev / mean_a;

        Ok(Self {
            delta,
            delta_stdev,
            percent_change,
            percent_change_stdev,
            percent_change_low: percent_change - 2.0 * percent_change_stdev,
            percent_change_high: percent_change + 2.0 * percent_change_stdev,
        })
    }

    /// Whether zero change lies outside the interval.
    pub fn is_significant(&self) -> bool {
        self.percent_change_low > 0.0 || self.percent_change_high < 0.0
    }
}

/// Compare two completed runs, `a` being the baseline.
pub fn compare(a: &SessionSummary, b: &SessionSummary) -> Result<ComparisonResult, MeasureError> {
    ComparisonResult::from_parts(a.mean, a.mean_stdev, b.mean, b.mean_stdev)
}
