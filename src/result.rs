//! Load run result types.

use crate::duration::nanos_serde;
use crate::metrics::MetricsSnapshot;
use crate::stage::Stage;
use crate::threshold::ThresholdBreach;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    /// Run name
    pub name: String,
    /// `METHOD url`
    pub target: String,
    /// Unix milliseconds when the run started
    pub started_at: String,
    /// Wall-clock duration including graceful stop
    #[serde(with = "nanos_serde")]
    pub duration: Duration,
    pub start_vus: u32,
    pub stages: Vec<Stage>,
    pub metrics: MetricsSnapshot,
    /// Iterations still running when the graceful-stop deadline passed
    #[serde(default)]
    pub interrupted_iterations: u64,
    /// Git commit hash (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
    /// Custom metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threshold_breaches: Vec<ThresholdBreach>,
}

impl LoadResult {
    /// Load a result from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// True when no threshold was breached.
    pub fn passed(&self) -> bool {
        self.threshold_breaches.is_empty()
    }

    /// Compare p95 latency against a baseline.
    ///
    /// Returns the ratio: `self.p95 / baseline.p95`.
    /// - `< 1.0` means faster (improvement)
    /// - `> 1.0` means slower (regression)
    ///
    /// A baseline without latency data compares as 1.0.
    pub fn compare(&self, baseline: &LoadResult) -> f64 {
        let base = baseline.metrics.latency.p95.as_secs_f64();
        if base == 0.0 {
            return 1.0;
        }
        self.metrics.latency.p95.as_secs_f64() / base
    }

    /// Check if this result regressed against a baseline.
    ///
    /// A result regresses when p95 is more than `threshold` slower (ratio),
    /// or the failure rate rose by more than `threshold` (absolute).
    pub fn is_regression(&self, baseline: &LoadResult, threshold: f64) -> bool {
        self.regressions(baseline, threshold).is_some()
    }

    /// Describe the regression against `baseline`, if any.
    pub fn regressions(&self, baseline: &LoadResult, threshold: f64) -> Option<Regression> {
        let latency_ratio = self.compare(baseline);
        let failure_rate_delta = self.metrics.failure_rate - baseline.metrics.failure_rate;

        let latency = latency_ratio > 1.0 + threshold;
        let failures = failure_rate_delta > threshold;
        if latency || failures {
            Some(Regression {
                latency_ratio,
                failure_rate_delta,
                latency,
                failures,
            })
        } else {
            None
        }
    }
}

/// How a run compares with its baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    /// Current p95 / baseline p95
    pub latency_ratio: f64,
    /// Current failure rate minus baseline failure rate
    pub failure_rate_delta: f64,
    /// p95 crossed the threshold
    pub latency: bool,
    /// Failure rate crossed the threshold
    pub failures: bool,
}
