//! Pass/fail limits evaluated against the final metrics.

use crate::duration::{format_duration, opt_human_serde};
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Optional limits; an unset limit is never breached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, with = "opt_human_serde", skip_serializing_if = "Option::is_none")]
    pub max_p95: Option<Duration>,
    #[serde(default, with = "opt_human_serde", skip_serializing_if = "Option::is_none")]
    pub max_p99: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failure_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_check_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rps: Option<f64>,
}

/// One limit that the run did not meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub metric: String,
    pub limit: String,
    pub observed: String,
}

impl fmt::Display for ThresholdBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: observed {}, limit {}", self.metric, self.observed, self.limit)
    }
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        *self == Thresholds::default()
    }

    pub fn max_p95(mut self, limit: Duration) -> Self {
        self.max_p95 = Some(limit);
        self
    }

    pub fn max_p99(mut self, limit: Duration) -> Self {
        self.max_p99 = Some(limit);
        self
    }

    pub fn max_failure_rate(mut self, rate: f64) -> Self {
        self.max_failure_rate = Some(rate);
        self
    }

    pub fn min_check_rate(mut self, rate: f64) -> Self {
        self.min_check_rate = Some(rate);
        self
    }

    pub fn min_rps(mut self, rps: f64) -> Self {
        self.min_rps = Some(rps);
        self
    }

    pub fn evaluate(&self, snap: &MetricsSnapshot) -> Vec<ThresholdBreach> {
        let mut breaches = Vec::new();

        let latency = [
            ("http_req_duration p(95)", self.max_p95, snap.latency.p95),
            ("http_req_duration p(99)", self.max_p99, snap.latency.p99),
        ];
        for (metric, limit, observed) in latency {
            if let Some(limit) = limit {
                if observed > limit {
                    breaches.push(ThresholdBreach {
                        metric: metric.to_string(),
                        limit: format!("<= {}", format_duration(limit)),
                        observed: format_duration(observed),
                    });
                }
            }
        }

        if let Some(limit) = self.max_failure_rate {
            if snap.failure_rate > limit {
                breaches.push(ThresholdBreach {
                    metric: "http_req_failed".to_string(),
                    limit: format!("<= {}", percent(limit)),
                    observed: percent(snap.failure_rate),
                });
            }
        }

        if let Some(limit) = self.min_check_rate {
            if snap.check_rate < limit {
                breaches.push(ThresholdBreach {
                    metric: "checks".to_string(),
                    limit: format!(">= {}", percent(limit)),
                    observed: percent(snap.check_rate),
                });
            }
        }

        if let Some(limit) = self.min_rps {
            if snap.requests_per_sec < limit {
                breaches.push(ThresholdBreach {
                    metric: "http_reqs rate".to_string(),
                    limit: format!(">= {:.2}/s", limit),
                    observed: format!("{:.2}/s", snap.requests_per_sec),
                });
            }
        }

        breaches
    }
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}
