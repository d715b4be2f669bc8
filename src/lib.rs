//! # cntryl-load
//!
//! A staged HTTP load generator for a single endpoint.
//!
//! Virtual users (VUs) ramp linearly through a list of stages, each one
//! sending requests back to back while it is inside the current target.
//! Every response is timed into an HDR histogram and run through named
//! checks; the run ends with latency percentiles, error rates, check pass
//! rates and optional threshold and baseline verdicts.
//!
//! The defaults reproduce a classic product-API smoke load: POST a fixed
//! JSON product to `http://localhost:8000/product`, ramping to 100 VUs over
//! 30 seconds, and check for `200`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cntryl_load::{Check, LoadConfig, LoadRunner, Stage, Thresholds};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = LoadConfig::new()
//!     .url("http://localhost:8000/product")
//!     .stages(vec![
//!         Stage::new(Duration::from_secs(30), 100),
//!         Stage::new(Duration::from_secs(10), 0),
//!     ])
//!     .checks(vec![Check::status("is status 200", 200)])
//!     .thresholds(Thresholds::default().max_p95(Duration::from_millis(500)));
//!
//! let result = LoadRunner::new(config)?.run().await?;
//! assert!(result.passed());
//! # Ok(())
//! # }
//! ```

mod check;
mod client;
mod config;
mod duration;
mod error;
mod metrics;
mod payload;
mod report;
mod result;
mod runner;
mod stage;
mod threshold;

pub use check::{default_checks, Check, CheckKind};
pub use client::{HttpTransport, RequestSpec, Response, Transport, TransportErrorKind};
pub use config::{parse_stages, LoadConfig, OptionsFile};
pub use duration::{format_duration, parse_duration};
pub use error::LoadError;
pub use metrics::{CheckCounts, LatencySummary, Metrics, MetricsSnapshot};
pub use payload::{Payload, ProductRequest};
pub use report::{
    render_annotations, render_summary, ConsoleReporter, GitHubActionsReporter, JsonReporter,
    MultiReporter, Reporter,
};
pub use result::{LoadResult, Regression};
pub use runner::{LoadRunner, StopHandle};
pub use stage::{Schedule, Stage};
pub use threshold::{ThresholdBreach, Thresholds};
