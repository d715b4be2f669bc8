//! Configuration for a load run.

use crate::check::{default_checks, Check};
use crate::client::RequestSpec;
use crate::duration::{opt_human_serde, parse_duration};
use crate::error::LoadError;
use crate::payload::Payload;
use crate::stage::{Schedule, Stage};
use crate::threshold::Thresholds;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the load runner.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Run name; used for the results directory.
    pub name: String,
    /// Method, URL, headers and per-request timeout.
    pub request: RequestSpec,
    /// Body sent by each iteration.
    pub payload: Payload,
    /// VU ramp profile.
    pub schedule: Schedule,
    /// Assertions evaluated on every response.
    pub checks: Vec<Check>,
    /// Limits that decide whether the run passed.
    pub thresholds: Thresholds,
    /// How long in-flight iterations may run after the schedule ends.
    pub graceful_stop: Duration,
    /// Interval between progress reports; zero disables them.
    pub progress_interval: Duration,
    /// Output directory for JSON results.
    pub output_dir: PathBuf,
    /// Print progress and summary.
    pub verbose: bool,
    /// Git SHA to include in results (for regression tracking).
    pub git_sha: Option<String>,
    /// Free-form labels copied into the results.
    pub metadata: BTreeMap<String, String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            name: "product".to_string(),
            request: RequestSpec::default(),
            payload: Payload::default(),
            schedule: Schedule::default(),
            checks: default_checks(),
            thresholds: Thresholds::default(),
            graceful_stop: Duration::from_secs(30),
            progress_interval: Duration::from_secs(1),
            output_dir: PathBuf::from("target/load"),
            verbose: true,
            git_sha: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// JSON options file. Every field is optional and overrides the config
/// it is applied to.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionsFile {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    /// `sample`, `random`, `none` or `@path` (relative to the options file).
    pub payload: Option<String>,
    pub start_vus: Option<u32>,
    pub stages: Option<Vec<Stage>>,
    pub checks: Option<Vec<Check>>,
    pub thresholds: Option<Thresholds>,
    #[serde(default, with = "opt_human_serde")]
    pub timeout: Option<Duration>,
    #[serde(default, with = "opt_human_serde")]
    pub graceful_stop: Option<Duration>,
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LoadConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `LOAD_URL`: target URL
    /// - `LOAD_METHOD`: HTTP method (default: POST)
    /// - `LOAD_STAGES`: comma-separated stages, e.g. `10s:20,30s:100`
    /// - `LOAD_START_VUS`: VUs at t=0 (default: 1)
    /// - `LOAD_PAYLOAD`: `sample`, `random`, `none` or `@path`
    /// - `LOAD_TIMEOUT`: per-request timeout, e.g. `5s`
    /// - `LOAD_OUTPUT_DIR`: output directory
    /// - `LOAD_VERBOSE`: verbose output (default: true)
    /// - `LOAD_GIT_SHA`: git commit hash
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`LoadConfig::from_env`] with an arbitrary variable source.
    /// Unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("LOAD_URL") {
            cfg.request.url = v;
        }
        if let Some(v) = lookup("LOAD_METHOD") {
            cfg.request.method = v.to_ascii_uppercase();
        }
        if let Some(v) = lookup("LOAD_STAGES") {
            match parse_stages(&v) {
                Ok(stages) => cfg.schedule.stages = stages,
                Err(e) => tracing::warn!("ignoring LOAD_STAGES: {}", e),
            }
        }
        if let Some(v) = lookup("LOAD_START_VUS") {
            match v.parse() {
                Ok(n) => cfg.schedule.start_vus = n,
                Err(_) => tracing::warn!("ignoring LOAD_START_VUS={:?}", v),
            }
        }
        if let Some(v) = lookup("LOAD_PAYLOAD") {
            match Payload::parse(&v) {
                Ok(p) => cfg.payload = p,
                Err(e) => tracing::warn!("ignoring LOAD_PAYLOAD: {}", e),
            }
        }
        if let Some(v) = lookup("LOAD_TIMEOUT") {
            match parse_duration(&v) {
                Ok(d) => cfg.request.timeout = d,
                Err(e) => tracing::warn!("ignoring LOAD_TIMEOUT: {}", e),
            }
        }
        if let Some(v) = lookup("LOAD_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOAD_VERBOSE") {
            cfg.verbose = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        cfg.git_sha = lookup("LOAD_GIT_SHA");

        cfg
    }

    /// Environment config overlaid with a JSON options file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let mut cfg = Self::from_env();
        cfg.apply_file(path)?;
        Ok(cfg)
    }

    /// Overlay a JSON options file onto this config.
    pub fn apply_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options: OptionsFile =
            serde_json::from_str(&content).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        self.apply_options(options, base)
    }

    /// Overlay already-parsed options; `@file` payloads resolve against `base`.
    pub fn apply_options(&mut self, options: OptionsFile, base: &Path) -> Result<(), LoadError> {
        if let Some(name) = options.name {
            self.name = name;
        }
        if let Some(url) = options.url {
            self.request.url = url;
        }
        if let Some(method) = options.method {
            self.request.method = method.to_ascii_uppercase();
        }
        if let Some(headers) = options.headers {
            self.request.headers = headers.into_iter().collect();
        }
        if let Some(payload) = options.payload {
            self.payload = match payload.strip_prefix('@') {
                Some(rel) => Payload::from_file(base.join(rel))?,
                None => Payload::parse(&payload)?,
            };
        }
        if let Some(start_vus) = options.start_vus {
            self.schedule.start_vus = start_vus;
        }
        if let Some(stages) = options.stages {
            self.schedule.stages = stages;
        }
        if let Some(checks) = options.checks {
            self.checks = checks;
        }
        if let Some(thresholds) = options.thresholds {
            self.thresholds = thresholds;
        }
        if let Some(timeout) = options.timeout {
            self.request.timeout = timeout;
        }
        if let Some(graceful_stop) = options.graceful_stop {
            self.graceful_stop = graceful_stop;
        }
        if let Some(output_dir) = options.output_dir {
            self.output_dir = output_dir;
        }
        self.metadata.extend(options.metadata);
        Ok(())
    }

    /// Fill in the git SHA from the working tree if none was given.
    pub fn detect_git_sha(mut self) -> Self {
        if self.git_sha.is_none() {
            self.git_sha = detect_git_sha();
        }
        self
    }

    /// Set the run name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the target URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.request.url = url.into();
        self
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.request.method = method.into().to_ascii_uppercase();
        self
    }

    /// Add or replace a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.request
            .headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.request.headers.push((name, value.into()));
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Replace the stages, keeping `start_vus`.
    pub fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.schedule.stages = stages;
        self
    }

    pub fn checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = timeout;
        self
    }

    pub fn graceful_stop(mut self, d: Duration) -> Self {
        self.graceful_stop = d;
        self
    }

    pub fn progress_interval(mut self, d: Duration) -> Self {
        self.progress_interval = d;
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Set verbose output.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    /// Set git SHA.
    pub fn git_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_sha = Some(sha.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        self.schedule.validate()?;

        let url = reqwest::Url::parse(&self.request.url)
            .map_err(|e| LoadError::Config(format!("invalid url '{}': {}", self.request.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoadError::Config(format!(
                "unsupported scheme '{}': only http and https are supported",
                url.scheme()
            )));
        }
        if reqwest::Method::from_bytes(self.request.method.as_bytes()).is_err() {
            return Err(LoadError::Config(format!(
                "invalid HTTP method '{}'",
                self.request.method
            )));
        }
        if self.request.timeout.is_zero() {
            return Err(LoadError::Config("request timeout must be greater than zero".into()));
        }
        if self.name.trim().is_empty() {
            return Err(LoadError::Config("run name must not be empty".into()));
        }
        Ok(())
    }
}

/// Parse a comma-separated stage list such as `10s:20,30s:100`.
pub fn parse_stages(s: &str) -> Result<Vec<Stage>, LoadError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

fn detect_git_sha() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                String::from_utf8(o.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn should_reproduce_product_script_by_default() {
        let cfg = LoadConfig::default();
        assert_eq!(cfg.request.method, "POST");
        assert_eq!(cfg.request.url, "http://localhost:8000/product");
        assert_eq!(cfg.schedule.stages, vec![Stage::new(Duration::from_secs(30), 100)]);
        assert_eq!(cfg.checks.len(), 1);
        assert_eq!(cfg.checks[0].name, "is status 200");
        assert!(cfg.thresholds.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn should_build_config_with_builder() {
        let cfg = LoadConfig::new()
            .url("https://api.example.com/items")
            .method("put")
            .header("content-type", "text/plain")
            .stages(vec![Stage::new(Duration::from_secs(5), 3)])
            .verbose(false);

        assert_eq!(cfg.request.method, "PUT");
        assert_eq!(cfg.request.headers, vec![("content-type".to_string(), "text/plain".to_string())]);
        assert_eq!(cfg.schedule.max_vus(), 3);
        assert!(!cfg.verbose);
    }

    #[test]
    fn should_read_variables_and_ignore_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("LOAD_URL", "http://127.0.0.1:9000/product"),
            ("LOAD_STAGES", "10s:20, 20s:0"),
            ("LOAD_START_VUS", "not-a-number"),
            ("LOAD_TIMEOUT", "5s"),
            ("LOAD_VERBOSE", "false"),
        ]
        .into_iter()
        .collect();

        let cfg = LoadConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.request.url, "http://127.0.0.1:9000/product");
        assert_eq!(cfg.schedule.stages.len(), 2);
        assert_eq!(cfg.schedule.start_vus, 1);
        assert_eq!(cfg.request.timeout, Duration::from_secs(5));
        assert!(!cfg.verbose);
    }

    #[test]
    fn should_ignore_out_of_range_timeout_variable() {
        let cfg = LoadConfig::from_lookup(|k| (k == "LOAD_TIMEOUT").then(|| "1e20".to_string()));
        assert_eq!(cfg.request.timeout, RequestSpec::default().timeout);
    }

    #[test]
    fn should_overlay_options_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("body.json"), "{}").unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(
            &path,
            r#"{
                "name": "smoke",
                "url": "http://localhost:8080/product",
                "payload": "@body.json",
                "stages": [{"duration": "10s", "target": 5}, {"duration": "5s", "target": 0}],
                "thresholds": {"max_p95": "300ms"},
                "graceful_stop": "5s",
                "metadata": {"env": "ci"}
            }"#,
        )
        .unwrap();

        let mut cfg = LoadConfig::default();
        cfg.apply_file(&path).unwrap();
        assert_eq!(cfg.name, "smoke");
        assert_eq!(cfg.schedule.total_duration(), Duration::from_secs(15));
        assert_eq!(cfg.thresholds.max_p95, Some(Duration::from_millis(300)));
        assert_eq!(cfg.graceful_stop, Duration::from_secs(5));
        assert_eq!(cfg.metadata.get("env").map(String::as_str), Some("ci"));
        assert!(matches!(cfg.payload, Payload::Raw { .. }));
    }

    #[test]
    fn should_load_bundled_demo_options() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");

        let mut product = LoadConfig::default();
        product.apply_file(demos.join("product.json")).unwrap();
        assert_eq!(product.schedule, Schedule::default());
        assert_eq!(product.checks, default_checks());
        assert!(product.validate().is_ok());

        let mut soak = LoadConfig::default();
        soak.apply_file(demos.join("ramp-and-hold.json")).unwrap();
        assert_eq!(soak.schedule.max_vus(), 100);
        assert_eq!(soak.schedule.total_duration(), Duration::from_secs(165));
        assert_eq!(soak.checks.len(), 2);
        assert!(matches!(soak.payload, Payload::RandomProduct));
        assert!(soak.validate().is_ok());
    }

    #[test]
    fn should_reject_unknown_option_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"vus": 10}"#).unwrap();
        let err = LoadConfig::default().apply_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn should_reject_invalid_targets() {
        assert!(LoadConfig::new().url("ftp://host/file").validate().is_err());
        assert!(LoadConfig::new().url("not a url").validate().is_err());
        assert!(LoadConfig::new().method("NOT A METHOD").validate().is_err());
        assert!(LoadConfig::new().timeout(Duration::ZERO).validate().is_err());
        assert!(LoadConfig::new().stages(vec![]).validate().is_err());
    }
}
