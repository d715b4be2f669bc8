//! cntryl-load: run a staged HTTP load test from the command line.
//!
//! `cntryl-load run` with no other flags posts the sample product to
//! `http://localhost:8000/product`, ramping from 1 to 100 VUs over 30 seconds
//! and checking for status 200.
//!
//! Configuration is layered, later sources winning:
//!
//! 1. `LOAD_*` environment variables
//! 2. `--config options.json`
//! 3. Command-line flags
//!
//! Exit codes: `0` success, `1` setup error or baseline regression,
//! `99` threshold breached.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cntryl_load::{
    parse_duration, Check, ConsoleReporter, GitHubActionsReporter, JsonReporter, LoadConfig,
    LoadResult, LoadRunner, Payload, Reporter, Stage,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit code when any threshold is breached.
const EXIT_THRESHOLDS: i32 = 99;
/// Exit code for regressions against a baseline.
const EXIT_REGRESSION: i32 = 1;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "cntryl-load",
    version,
    about = "Staged HTTP load generator",
    long_about = "
cntryl-load ramps virtual users against a single HTTP endpoint, checks every
response, and reports latency percentiles, error rates and check pass rates.

Example:
    cntryl-load run                                   # POST sample product, 1 -> 100 VUs over 30s
    cntryl-load run --stage 10s:20 --stage 1m:20 --stage 10s:0
    cntryl-load run --url http://localhost:8080/product --payload random
    cntryl-load run --config options.json --threshold-p95 300ms
    cntryl-load compare target/load/product/latest.json baseline.json
"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a load test
    Run(RunArgs),
    /// Compare two results files for regressions
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    // ========================================================================
    // Target
    // ========================================================================
    /// JSON options file (stages, checks, thresholds, ...)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target URL
    #[arg(long)]
    url: Option<String>,

    /// HTTP method
    #[arg(long)]
    method: Option<String>,

    /// Request header as "Name: value" (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Request body: sample, random, none, or @path/to/file
    #[arg(long)]
    payload: Option<String>,

    /// Per-request timeout (e.g. 5s)
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,

    // ========================================================================
    // Load Profile
    // ========================================================================
    /// Ramp stage as <duration>:<target> (repeatable, e.g. 30s:100)
    #[arg(long = "stage", short = 's')]
    stages: Vec<String>,

    /// VUs at t=0
    #[arg(long)]
    start_vus: Option<u32>,

    /// Time in-flight iterations get to finish once the stages end
    #[arg(long, value_parser = parse_duration_arg)]
    graceful_stop: Option<Duration>,

    // ========================================================================
    // Checks & Thresholds
    // ========================================================================
    /// Check that every response has this status (replaces default checks)
    #[arg(long)]
    expect_status: Option<u16>,

    /// Check that every response body contains this text
    #[arg(long)]
    check_body: Option<String>,

    /// Fail the run if p95 latency exceeds this (e.g. 500ms)
    #[arg(long, value_parser = parse_duration_arg)]
    threshold_p95: Option<Duration>,

    /// Fail the run if p99 latency exceeds this
    #[arg(long, value_parser = parse_duration_arg)]
    threshold_p99: Option<Duration>,

    /// Fail the run if the failed-request rate exceeds this (0.0 - 1.0)
    #[arg(long)]
    max_failure_rate: Option<f64>,

    /// Fail the run if the check pass rate is below this (0.0 - 1.0)
    #[arg(long)]
    min_check_rate: Option<f64>,

    /// Fail the run if throughput is below this many requests per second
    #[arg(long)]
    min_rps: Option<f64>,

    // ========================================================================
    // Output Control
    // ========================================================================
    /// Run name (results go to <output-dir>/<name>/)
    #[arg(long)]
    name: Option<String>,

    /// Output directory for JSON results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Don't write JSON results
    #[arg(long)]
    no_json: bool,

    /// Verbose output
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (minimal output, only errors)
    #[arg(long, short = 'q')]
    quiet: bool,

    // ========================================================================
    // Regression Detection
    // ========================================================================
    /// Baseline JSON file for regression comparison
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Regression threshold (default: 5%)
    #[arg(long, default_value_t = 0.05)]
    regression_threshold: f64,
}

#[derive(Debug, Args)]
struct CompareArgs {
    /// Results file of the run under test
    current: PathBuf,

    /// Results file to compare against
    baseline: PathBuf,

    /// Regression threshold (default: 5%)
    #[arg(long, default_value_t = 0.05)]
    threshold: f64,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

// ============================================================================
// Verbosity Control
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_args(args: &RunArgs) -> Self {
        if args.quiet {
            Verbosity::Quiet
        } else if args.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn is_quiet(&self) -> bool {
        *self == Verbosity::Quiet
    }

    fn default_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "cntryl_load=debug",
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags.
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run(args) => run_load(args).await,
        Commands::Compare(args) => {
            init_tracing(Verbosity::Normal);
            compare_files(&args)
        }
    }
}

async fn run_load(args: RunArgs) -> Result<()> {
    let verbosity = Verbosity::from_args(&args);
    init_tracing(verbosity);

    // Step 1: Layer configuration
    let config = build_config(&args)?;
    config.validate().context("Invalid load configuration")?;

    // Step 2: Wire reporters
    let mut runner = LoadRunner::new(config.clone()).context("Failed to create HTTP client")?;
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
    if !verbosity.is_quiet() {
        reporters.push(Box::new(ConsoleReporter::new()));
    }
    if !args.no_json {
        reporters.push(Box::new(JsonReporter::new(config.output_dir.clone())));
    }
    reporters.push(Box::new(GitHubActionsReporter));
    runner.reporters(reporters);

    // Step 3: Ctrl-C stops gracefully
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping (in-flight requests will finish)");
            stop.stop();
        }
    });

    // Step 4: Run
    let result = runner.run().await.context("Load run failed")?;

    // Step 5: Regression check against baseline
    if let Some(ref baseline_path) = args.baseline {
        if report_regression(&result, baseline_path, args.regression_threshold)? {
            std::process::exit(EXIT_REGRESSION);
        }
    }

    // Step 6: Thresholds decide the exit code
    if !result.passed() {
        if !verbosity.is_quiet() {
            eprintln!(
                "\n❌ {} threshold(s) breached",
                result.threshold_breaches.len()
            );
        }
        std::process::exit(EXIT_THRESHOLDS);
    }

    if !verbosity.is_quiet() {
        eprintln!(
            "\n✅ {} requests, {:.2}% failed",
            result.metrics.http_reqs,
            result.metrics.failure_rate * 100.0
        );
    }

    Ok(())
}

// ============================================================================
// Configuration Layering
// ============================================================================

fn build_config(args: &RunArgs) -> Result<LoadConfig> {
    let mut config = LoadConfig::from_env().detect_git_sha();

    if let Some(ref path) = args.config {
        config
            .apply_file(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?;
    }

    if let Some(ref name) = args.name {
        config = config.name(name.clone());
    }
    if let Some(ref url) = args.url {
        config = config.url(url.clone());
    }
    if let Some(ref method) = args.method {
        config = config.method(method.clone());
    }
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        config = config.header(name, value);
    }
    if let Some(ref payload) = args.payload {
        config = config.payload(
            Payload::parse(payload).with_context(|| format!("Invalid --payload '{}'", payload))?,
        );
    }
    if let Some(timeout) = args.timeout {
        config = config.timeout(timeout);
    }

    if !args.stages.is_empty() {
        let stages = args
            .stages
            .iter()
            .map(|s| s.parse::<Stage>())
            .collect::<Result<Vec<_>, _>>()?;
        config = config.stages(stages);
    }
    if let Some(start_vus) = args.start_vus {
        config.schedule.start_vus = start_vus;
    }
    if let Some(graceful_stop) = args.graceful_stop {
        config = config.graceful_stop(graceful_stop);
    }

    if let Some(status) = args.expect_status {
        config = config.checks(vec![Check::status(format!("is status {}", status), status)]);
    }
    if let Some(ref text) = args.check_body {
        config
            .checks
            .push(Check::body_contains(format!("body contains {:?}", text), text.clone()));
    }

    let mut thresholds = config.thresholds.clone();
    if let Some(limit) = args.threshold_p95 {
        thresholds = thresholds.max_p95(limit);
    }
    if let Some(limit) = args.threshold_p99 {
        thresholds = thresholds.max_p99(limit);
    }
    if let Some(rate) = args.max_failure_rate {
        thresholds = thresholds.max_failure_rate(check_rate_arg("--max-failure-rate", rate)?);
    }
    if let Some(rate) = args.min_check_rate {
        thresholds = thresholds.min_check_rate(check_rate_arg("--min-check-rate", rate)?);
    }
    if let Some(rps) = args.min_rps {
        thresholds = thresholds.min_rps(rps);
    }
    config = config.thresholds(thresholds);

    if let Some(ref dir) = args.output_dir {
        config = config.output_dir(dir.clone());
    }
    config = config.verbose(!args.quiet);

    Ok(config)
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Invalid header '{}': expected \"Name: value\"", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn check_rate_arg(flag: &str, rate: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&rate) {
        bail!("{} must be between 0.0 and 1.0, got {}", flag, rate);
    }
    Ok(rate)
}

// ============================================================================
// Regression Detection
// ============================================================================

fn compare_files(args: &CompareArgs) -> Result<()> {
    let current = LoadResult::load(&args.current)
        .with_context(|| format!("Failed to read results {}", args.current.display()))?;
    if report_regression(&current, &args.baseline, args.threshold)? {
        std::process::exit(EXIT_REGRESSION);
    }
    Ok(())
}

/// Print the comparison; returns true on regression.
fn report_regression(current: &LoadResult, baseline_path: &Path, threshold: f64) -> Result<bool> {
    let baseline = LoadResult::load(baseline_path)
        .with_context(|| format!("Failed to read baseline {}", baseline_path.display()))?;

    let ratio = current.compare(&baseline);
    eprintln!(
        "\nBaseline: p95 {:.1}% {}, failure rate {:+.2} pts",
        (ratio - 1.0).abs() * 100.0,
        if ratio > 1.0 { "slower" } else { "faster" },
        (current.metrics.failure_rate - baseline.metrics.failure_rate) * 100.0
    );

    match current.regressions(&baseline, threshold) {
        Some(regression) => {
            eprintln!("\n❌ Regression detected against {}", baseline_path.display());
            if regression.latency {
                eprintln!(
                    "  p95 latency is {:.1}% slower",
                    (regression.latency_ratio - 1.0) * 100.0
                );
            }
            if regression.failures {
                eprintln!(
                    "  failure rate rose by {:.2} points",
                    regression.failure_rate_delta * 100.0
                );
            }
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["cntryl-load", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).cmd {
            Commands::Run(args) => args,
            Commands::Compare(_) => unreachable!(),
        }
    }

    #[test]
    fn should_layer_flags_over_defaults() {
        let args = run_args(&[
            "--url",
            "http://127.0.0.1:9/product",
            "-s",
            "5s:10",
            "-s",
            "5s:0",
            "--expect-status",
            "201",
            "--threshold-p95",
            "250ms",
            "-H",
            "X-Trace: abc",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.request.url, "http://127.0.0.1:9/product");
        assert_eq!(config.schedule.stages.len(), 2);
        assert_eq!(config.checks[0].name, "is status 201");
        assert_eq!(config.thresholds.max_p95, Some(Duration::from_millis(250)));
        assert!(config
            .request
            .headers
            .contains(&("X-Trace".to_string(), "abc".to_string())));
    }

    #[test]
    fn should_log_warnings_only_by_default() {
        assert_eq!(Verbosity::from_args(&run_args(&[])), Verbosity::Normal);
        assert_eq!(Verbosity::Normal.default_directive(), "warn");
        assert_eq!(
            Verbosity::from_args(&run_args(&["-v"])).default_directive(),
            "cntryl_load=debug"
        );
        assert_eq!(
            Verbosity::from_args(&run_args(&["-q"])).default_directive(),
            "error"
        );
    }

    #[test]
    fn should_reject_bad_flags() {
        assert!(build_config(&run_args(&["-s", "forever"])).is_err());
        assert!(build_config(&run_args(&["-H", "no-colon"])).is_err());
        assert!(build_config(&run_args(&["--min-check-rate", "1.5"])).is_err());
    }
}
