//! Thread-safe metrics aggregation shared by all virtual users.

use crate::client::{Response, TransportErrorKind};
use crate::duration::nanos_serde;
use crate::error::LoadError;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Latency histogram bounds in microseconds: 1µs to 60s.
const HIST_LOW_US: u64 = 1;
const HIST_HIGH_US: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Pass/fail tally for one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounts {
    fn bump(&mut self, passed: bool) {
        if passed {
            self.passes += 1;
        } else {
            self.fails += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of evaluations that passed; 0.0 when never evaluated.
    pub fn rate(&self) -> f64 {
        ratio(self.passes, self.total())
    }
}

/// Request duration distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    #[serde(with = "nanos_serde")]
    pub min: Duration,
    #[serde(with = "nanos_serde")]
    pub mean: Duration,
    #[serde(with = "nanos_serde")]
    pub p50: Duration,
    #[serde(with = "nanos_serde")]
    pub p90: Duration,
    #[serde(with = "nanos_serde")]
    pub p95: Duration,
    #[serde(with = "nanos_serde")]
    pub p99: Duration,
    #[serde(with = "nanos_serde")]
    pub max: Duration,
}

impl LatencySummary {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::default();
        }
        let at = |q: f64| Duration::from_micros(hist.value_at_quantile(q));
        Self {
            min: Duration::from_micros(hist.min()),
            mean: Duration::from_secs_f64(hist.mean() / 1_000_000.0),
            p50: at(0.50),
            p90: at(0.90),
            p95: at(0.95),
            p99: at(0.99),
            max: Duration::from_micros(hist.max()),
        }
    }
}

/// Point-in-time view of every metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(with = "nanos_serde")]
    pub elapsed: Duration,
    pub http_reqs: u64,
    /// Transport errors plus responses outside 200-399.
    pub http_req_failed: u64,
    pub iterations: u64,
    pub data_sent: u64,
    pub data_received: u64,
    /// Scheduled VU target at snapshot time.
    pub vus: u32,
    /// VUs allocated so far.
    pub vus_max: u32,
    pub latency: LatencySummary,
    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub failure_rate: f64,
    pub check_rate: f64,
    #[serde(default)]
    pub status_codes: BTreeMap<u16, u64>,
    #[serde(default)]
    pub transport_errors: BTreeMap<TransportErrorKind, u64>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckCounts>,
}

impl MetricsSnapshot {
    pub fn check_passes(&self) -> u64 {
        self.checks.values().map(|c| c.passes).sum()
    }

    pub fn check_fails(&self) -> u64 {
        self.checks.values().map(|c| c.fails).sum()
    }
}

struct Inner {
    latency: Histogram<u64>,
    status_codes: BTreeMap<u16, u64>,
    transport_errors: BTreeMap<TransportErrorKind, u64>,
    checks: BTreeMap<String, CheckCounts>,
}

/// Aggregates everything the VUs observe.
///
/// Counters are lock-free; the histogram and the breakdown maps share one
/// mutex so each response is recorded under a single acquisition.
pub struct Metrics {
    http_reqs: AtomicU64,
    http_req_failed: AtomicU64,
    iterations: AtomicU64,
    data_sent: AtomicU64,
    data_received: AtomicU64,
    vus: AtomicU32,
    vus_max: AtomicU32,
    inner: Mutex<Inner>,
}

impl Metrics {
    pub fn new() -> Result<Self, LoadError> {
        let latency = Histogram::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
            .map_err(|e| LoadError::Config(format!("latency histogram: {:?}", e)))?;
        Ok(Self {
            http_reqs: AtomicU64::new(0),
            http_req_failed: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            data_sent: AtomicU64::new(0),
            data_received: AtomicU64::new(0),
            vus: AtomicU32::new(0),
            vus_max: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                latency,
                status_codes: BTreeMap::new(),
                transport_errors: BTreeMap::new(),
                checks: BTreeMap::new(),
            }),
        })
    }

    /// Record a request that produced a status code.
    pub fn record_response(&self, response: &Response, bytes_sent: u64) {
        self.http_reqs.fetch_add(1, Ordering::Relaxed);
        self.data_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        self.data_received
            .fetch_add(response.body.len() as u64, Ordering::Relaxed);
        if !(200..=399).contains(&response.status) {
            self.http_req_failed.fetch_add(1, Ordering::Relaxed);
        }

        let micros = (response.duration.as_micros() as u64).max(HIST_LOW_US);
        let mut inner = self.inner.lock();
        inner.latency.saturating_record(micros);
        *inner.status_codes.entry(response.status).or_insert(0) += 1;
    }

    /// Record a request that never produced a status code.
    pub fn record_transport_error(&self, kind: TransportErrorKind, bytes_sent: u64) {
        self.http_reqs.fetch_add(1, Ordering::Relaxed);
        self.http_req_failed.fetch_add(1, Ordering::Relaxed);
        self.data_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        *self.inner.lock().transport_errors.entry(kind).or_insert(0) += 1;
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        let mut inner = self.inner.lock();
        // Avoid allocating the key on the hot path once it exists.
        if let Some(counts) = inner.checks.get_mut(name) {
            counts.bump(passed);
            return;
        }
        inner.checks.entry(name.to_string()).or_default().bump(passed);
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the scheduled VU target. VUs above it finish their current
    /// iteration before parking.
    pub fn set_vus(&self, n: u32) {
        self.vus.store(n, Ordering::Relaxed);
    }

    /// Count a newly allocated VU. Parked VUs are reused, so this only
    /// grows when the target exceeds every earlier target.
    pub fn add_vu(&self) {
        self.vus_max.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let http_reqs = self.http_reqs.load(Ordering::Relaxed);
        let http_req_failed = self.http_req_failed.load(Ordering::Relaxed);
        let iterations = self.iterations.load(Ordering::Relaxed);

        let inner = self.inner.lock();
        let latency = LatencySummary::from_histogram(&inner.latency);
        let checks = inner.checks.clone();
        let status_codes = inner.status_codes.clone();
        let transport_errors = inner.transport_errors.clone();
        drop(inner);

        let passes: u64 = checks.values().map(|c| c.passes).sum();
        let total: u64 = checks.values().map(CheckCounts::total).sum();
        let secs = elapsed.as_secs_f64();
        let per_sec = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };

        MetricsSnapshot {
            elapsed,
            http_reqs,
            http_req_failed,
            iterations,
            data_sent: self.data_sent.load(Ordering::Relaxed),
            data_received: self.data_received.load(Ordering::Relaxed),
            vus: self.vus.load(Ordering::Relaxed),
            vus_max: self.vus_max.load(Ordering::Relaxed),
            latency,
            requests_per_sec: per_sec(http_reqs),
            iterations_per_sec: per_sec(iterations),
            failure_rate: ratio(http_req_failed, http_reqs),
            check_rate: ratio(passes, total),
            status_codes,
            transport_errors,
            checks,
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
