//! Pluggable reporters for load run output.
//!
//! All reporters implement the `Reporter` trait and are designed to be:
//! - Non-panicking: errors are logged but never propagate
//! - Atomic: output is written in complete lines to avoid interleaving

use crate::config::LoadConfig;
use crate::duration::{format_duration, to_human};
use crate::metrics::MetricsSnapshot;
use crate::result::LoadResult;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for load run reporters.
pub trait Reporter: Send + Sync {
    /// Called once before any VU starts.
    fn run_start(&self, _config: &LoadConfig) {}

    /// Called every progress interval while the run is active.
    fn progress(&self, _snapshot: &MetricsSnapshot) {}

    /// Called once with the final result.
    fn run_end(&self, _result: &LoadResult) {}
}

/// Width of the dotted metric-name column in the summary.
const METRIC_WIDTH: usize = 32;

/// Console reporter that prints progress and the end-of-run summary to stdout.
pub struct ConsoleReporter {
    show_progress: bool,
    /// Mutex ensures atomic writes across threads.
    output_lock: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_progress: true,
            output_lock: Mutex::new(()),
        }
    }

    /// Print a line every progress interval.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Atomically write a complete message to stdout.
    /// Never panics; logs warning on error.
    fn write_stdout(&self, message: &str) {
        // Ignore poison: another thread panicking must not silence output.
        let _guard = self.output_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", message) {
            tracing::warn!("failed to write to stdout: {}", e);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn run_start(&self, config: &LoadConfig) {
        let stages: Vec<_> = config
            .schedule
            .stages
            .iter()
            .map(|s| format!("{} → {} VUs", to_human(s.duration), s.target))
            .collect();
        let header = format!(
            "---------------------------------------------------------------\n\
             Load Run: {}\n\
             Target:   {}\n\
             Payload:  {}\n\
             Stages:   {} (start {} VUs, max {} VUs, {} + {} graceful stop)\n\
             ---------------------------------------------------------------",
            config.name,
            config.request,
            config.payload.describe(),
            stages.join(", "),
            config.schedule.start_vus,
            config.schedule.max_vus(),
            to_human(config.schedule.total_duration()),
            to_human(config.graceful_stop),
        );
        self.write_stdout(&header);
    }

    fn progress(&self, snapshot: &MetricsSnapshot) {
        if !self.show_progress {
            return;
        }
        let line = format!(
            "running ({:>7.1}s), {:>4} VUs, {} complete iterations, {} reqs, {:.2}% failed",
            snapshot.elapsed.as_secs_f64(),
            snapshot.vus,
            snapshot.iterations,
            snapshot.http_reqs,
            snapshot.failure_rate * 100.0
        );
        self.write_stdout(&line);
    }

    fn run_end(&self, result: &LoadResult) {
        self.write_stdout(&render_summary(result));
    }
}

/// Render the end-of-run summary shown on the console and in `latest.txt`.
pub fn render_summary(result: &LoadResult) -> String {
    let m = &result.metrics;
    let mut out = String::new();

    let _ = writeln!(out);
    for (name, counts) in &m.checks {
        if counts.fails == 0 {
            let _ = writeln!(out, "     ✓ {}", name);
        } else {
            let _ = writeln!(out, "     ✗ {}", name);
            let _ = writeln!(
                out,
                "      ↳  {:.0}% — ✓ {} / ✗ {}",
                counts.rate() * 100.0,
                counts.passes,
                counts.fails
            );
        }
    }
    if !m.checks.is_empty() {
        let _ = writeln!(out);
    }

    let secs = m.elapsed.as_secs_f64();
    let rate = |bytes: u64| if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
    let l = &m.latency;

    let mut lines = Vec::new();
    if !m.checks.is_empty() {
        lines.push((
            "checks",
            format!(
                "{:.2}% ✓ {} ✗ {}",
                m.check_rate * 100.0,
                m.check_passes(),
                m.check_fails()
            ),
        ));
    }
    lines.push((
        "data_received",
        format!("{} {}/s", format_bytes(m.data_received as f64), format_bytes(rate(m.data_received))),
    ));
    lines.push((
        "data_sent",
        format!("{} {}/s", format_bytes(m.data_sent as f64), format_bytes(rate(m.data_sent))),
    ));
    lines.push((
        "http_req_duration",
        format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
            format_duration(l.mean),
            format_duration(l.min),
            format_duration(l.p50),
            format_duration(l.max),
            format_duration(l.p90),
            format_duration(l.p95),
            format_duration(l.p99)
        ),
    ));
    lines.push((
        "http_req_failed",
        format!(
            "{:.2}% ✓ {} ✗ {}",
            m.failure_rate * 100.0,
            m.http_req_failed,
            m.http_reqs - m.http_req_failed.min(m.http_reqs)
        ),
    ));
    lines.push((
        "http_reqs",
        format!("{} {:.2}/s", m.http_reqs, m.requests_per_sec),
    ));
    lines.push((
        "iterations",
        format!("{} {:.2}/s", m.iterations, m.iterations_per_sec),
    ));
    if result.interrupted_iterations > 0 {
        lines.push(("interrupted_iterations", result.interrupted_iterations.to_string()));
    }
    lines.push(("vus_max", m.vus_max.to_string()));

    for (name, value) in lines {
        let _ = writeln!(out, "     {}: {}", dotted(name), value);
    }

    if !m.status_codes.is_empty() || !m.transport_errors.is_empty() {
        let _ = writeln!(out);
        for (status, count) in &m.status_codes {
            let _ = writeln!(out, "     status {}: {}", status, count);
        }
        for (kind, count) in &m.transport_errors {
            let _ = writeln!(out, "     {} errors: {}", kind, count);
        }
    }

    if !result.threshold_breaches.is_empty() {
        let _ = writeln!(out);
        for breach in &result.threshold_breaches {
            let _ = writeln!(out, "     ✗ threshold {}", breach);
        }
    }

    let _ = writeln!(out);
    let _ = write!(
        out,
        "---------------------------------------------------------------\n\
         Completed {} iterations in {}\n\
         ---------------------------------------------------------------",
        m.iterations,
        format_duration(result.duration)
    );
    out
}

fn dotted(name: &str) -> String {
    let mut s = name.to_string();
    while s.chars().count() < METRIC_WIDTH {
        s.push('.');
    }
    s
}

/// Format a byte count with decimal units.
fn format_bytes(bytes: f64) -> String {
    if bytes >= 1_000_000_000.0 {
        format!("{:.2} GB", bytes / 1_000_000_000.0)
    } else if bytes >= 1_000_000.0 {
        format!("{:.2} MB", bytes / 1_000_000.0)
    } else if bytes >= 1_000.0 {
        format!("{:.2} kB", bytes / 1_000.0)
    } else {
        format!("{:.0} B", bytes)
    }
}

/// JSON reporter that writes results to a file.
///
/// Writes results organized by run name:
/// - `{name}/{started_at}.json` - Machine-readable results
/// - `{name}/latest.json` and `latest.txt` - Most recent results
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Reporter for JsonReporter {
    fn run_end(&self, result: &LoadResult) {
        match write_json_results(&self.output_dir, result) {
            Ok(path) => tracing::info!("results written to {}", path.display()),
            Err(e) => tracing::warn!("failed to write JSON results: {}", e),
        }
    }
}

fn write_json_results(output_dir: &Path, result: &LoadResult) -> std::io::Result<PathBuf> {
    let dir = output_dir.join(result.name.replace(['/', '\\'], "_"));
    std::fs::create_dir_all(&dir)?;

    let json = serde_json::to_string_pretty(result).map_err(std::io::Error::other)?;
    let path = dir.join(format!("{}.json", result.started_at));
    std::fs::write(&path, &json)?;
    std::fs::write(dir.join("latest.json"), &json)?;
    std::fs::write(dir.join("latest.txt"), render_summary(result))?;

    Ok(path)
}

/// GitHub Actions reporter that emits annotations.
///
/// Silent unless `GITHUB_ACTIONS` is set.
pub struct GitHubActionsReporter;

impl Reporter for GitHubActionsReporter {
    fn run_end(&self, result: &LoadResult) {
        if std::env::var("GITHUB_ACTIONS").is_err() {
            return;
        }
        print!("{}", render_annotations(result));
    }
}

/// One `::error` per breached threshold, then a collapsed results group.
pub fn render_annotations(result: &LoadResult) -> String {
    let mut out = String::new();
    for breach in &result.threshold_breaches {
        out.push_str(&format!(
            "::error title=Load Threshold::{} ({})\n",
            breach, result.name
        ));
    }

    let m = &result.metrics;
    out.push_str("::group::Load Results\n");
    out.push_str(&format!(
        "  http_reqs: {} ({:.2}/s)\n",
        m.http_reqs, m.requests_per_sec
    ));
    out.push_str(&format!(
        "  http_req_failed: {:.2}%\n",
        m.failure_rate * 100.0
    ));
    out.push_str(&format!("  p95: {}\n", format_duration(m.latency.p95)));
    out.push_str(&format!("  checks: {:.2}%\n", m.check_rate * 100.0));
    out.push_str("::endgroup::\n");
    out
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn run_start(&self, config: &LoadConfig) {
        for r in &self.reporters {
            r.run_start(config);
        }
    }

    fn progress(&self, snapshot: &MetricsSnapshot) {
        for r in &self.reporters {
            r.progress(snapshot);
        }
    }

    fn run_end(&self, result: &LoadResult) {
        for r in &self.reporters {
            r.run_end(result);
        }
    }
}
