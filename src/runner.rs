//! The staged virtual-user executor.

use crate::check::Check;
use crate::client::{HttpTransport, RequestSpec, Transport, TransportErrorKind};
use crate::config::LoadConfig;
use crate::error::LoadError;
use crate::metrics::Metrics;
use crate::payload::Payload;
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::result::LoadResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// How often the controller re-evaluates the VU target.
const CONTROL_TICK: Duration = Duration::from_millis(100);

/// Requests a graceful early stop of a running [`LoadRunner`].
///
/// Cloning is cheap; every clone controls the same run.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Stop ramping and let in-flight iterations finish.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// State shared by every VU task.
struct Shared {
    request: RequestSpec,
    payload: Payload,
    checks: Vec<Check>,
    transport: Arc<dyn Transport>,
    metrics: Metrics,
    interrupted: AtomicU64,
}

/// Marks an iteration as interrupted unless it runs to completion.
struct InFlight<'a> {
    interrupted: &'a AtomicU64,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.interrupted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Shared {
    /// One iteration: build the body, send it, record the outcome, run checks.
    async fn run_iteration(&self) {
        let mut guard = InFlight {
            interrupted: &self.interrupted,
            done: false,
        };

        match self.payload.body() {
            Ok(body) => {
                let sent = body.len() as u64;
                match self.transport.send(&self.request, body).await {
                    Ok(response) => {
                        self.metrics.record_response(&response, sent);
                        for check in &self.checks {
                            self.metrics
                                .record_check(&check.name, check.evaluate(&response));
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "request failed");
                        let kind = e.transport_kind().unwrap_or(TransportErrorKind::Request);
                        self.metrics.record_transport_error(kind, sent);
                    }
                }
                self.metrics.record_iteration();
            }
            Err(e) => tracing::warn!("skipping iteration, payload failed: {}", e),
        }

        guard.done = true;
    }
}

/// VU `id` iterates back to back while `id < target`, and parks otherwise.
async fn vu_loop(
    id: u32,
    shared: Arc<Shared>,
    mut target: watch::Receiver<u32>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::trace!(vu = id, "vu started");
    shared.metrics.add_vu();
    loop {
        if *stop.borrow() {
            break;
        }
        if id >= *target.borrow_and_update() {
            tokio::select! {
                res = target.changed() => if res.is_err() { break },
                res = stop.changed() => if res.is_err() { break },
            }
            continue;
        }
        shared.run_iteration().await;
        // The transport may never pend; keep the controller scheduled.
        tokio::task::yield_now().await;
    }
    tracing::trace!(vu = id, "vu finished");
}

/// Ramps virtual users through the configured stages against one endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use cntryl_load::{LoadConfig, LoadRunner, Stage};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), cntryl_load::LoadError> {
/// let config = LoadConfig::new()
///     .url("http://localhost:8000/product")
///     .stages(vec![Stage::new(Duration::from_secs(30), 100)]);
///
/// let result = LoadRunner::new(config)?.run().await?;
/// println!("p95: {:?}", result.metrics.latency.p95);
/// # Ok(())
/// # }
/// ```
pub struct LoadRunner {
    config: LoadConfig,
    transport: Arc<dyn Transport>,
    reporters: Vec<Box<dyn Reporter>>,
    stop: StopHandle,
}

impl LoadRunner {
    /// Create a runner with a pooled HTTP transport.
    pub fn new(config: LoadConfig) -> Result<Self, LoadError> {
        let pool = config.schedule.max_vus() as usize;
        let transport = HttpTransport::new(pool)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a runner with a custom transport.
    pub fn with_transport(config: LoadConfig, transport: Arc<dyn Transport>) -> Self {
        // Default reporters: console (when verbose) + JSON
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.verbose {
            reporters.push(Box::new(ConsoleReporter::new()));
        }
        reporters.push(Box::new(JsonReporter::new(config.output_dir.clone())));

        Self {
            config,
            transport,
            reporters,
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Replace reporters with a custom set.
    pub fn reporters(&mut self, reporters: Vec<Box<dyn Reporter>>) -> &mut Self {
        self.reporters = reporters;
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    /// Handle for stopping the run early, e.g. on Ctrl-C.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Execute the schedule and return the aggregated result.
    pub async fn run(self) -> Result<LoadResult, LoadError> {
        self.config.validate()?;

        let shared = Arc::new(Shared {
            request: self.config.request.clone(),
            payload: self.config.payload.clone(),
            checks: self.config.checks.clone(),
            transport: Arc::clone(&self.transport),
            metrics: Metrics::new()?,
            interrupted: AtomicU64::new(0),
        });

        for r in &self.reporters {
            r.run_start(&self.config);
        }
        tracing::info!(
            url = %self.config.request,
            max_vus = self.config.schedule.max_vus(),
            duration = ?self.config.schedule.total_duration(),
            "load run starting"
        );

        let started_at = unix_millis();
        let start = Instant::now();
        let (target_tx, _) = watch::channel(0u32);
        let mut stop_rx = self.stop.subscribe();
        let mut vus = JoinSet::new();
        let mut spawned = 0u32;

        let progress_every = self.config.progress_interval;
        let mut next_progress = progress_every;

        let mut tick = tokio::time::interval(CONTROL_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                res = stop_rx.changed() => if res.is_err() { break },
            }
            if *stop_rx.borrow() {
                tracing::info!("stop requested, ending run early");
                break;
            }

            let elapsed = start.elapsed();
            let Some(target) = self.config.schedule.target_at(elapsed) else {
                break;
            };

            target_tx.send_replace(target);
            while spawned < target {
                vus.spawn(vu_loop(
                    spawned,
                    Arc::clone(&shared),
                    target_tx.subscribe(),
                    self.stop.subscribe(),
                ));
                spawned += 1;
            }
            shared.metrics.set_vus(target);

            if !progress_every.is_zero() && elapsed >= next_progress {
                let snapshot = shared.metrics.snapshot(elapsed);
                for r in &self.reporters {
                    r.progress(&snapshot);
                }
                while next_progress <= elapsed {
                    next_progress += progress_every;
                }
            }
        }

        // Let in-flight iterations finish, then cut whatever is left.
        self.stop.stop();
        let drained = tokio::time::timeout(self.config.graceful_stop, async {
            while vus.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            vus.abort_all();
            while vus.join_next().await.is_some() {}
        }
        let interrupted_iterations = shared.interrupted.load(Ordering::SeqCst);
        if interrupted_iterations > 0 {
            tracing::warn!(
                interrupted = interrupted_iterations,
                "graceful stop of {:?} expired, aborted remaining VUs",
                self.config.graceful_stop
            );
        }
        shared.metrics.set_vus(0);

        let duration = start.elapsed();
        let metrics = shared.metrics.snapshot(duration);
        let threshold_breaches = self.config.thresholds.evaluate(&metrics);

        let result = LoadResult {
            name: self.config.name.clone(),
            target: self.config.request.to_string(),
            started_at,
            duration,
            start_vus: self.config.schedule.start_vus,
            stages: self.config.schedule.stages.clone(),
            metrics,
            interrupted_iterations,
            git_sha: self.config.git_sha.clone(),
            metadata: self.config.metadata.clone(),
            threshold_breaches,
        };

        for r in &self.reporters {
            r.run_end(&result);
        }
        tracing::info!(
            http_reqs = result.metrics.http_reqs,
            failed = result.metrics.http_req_failed,
            passed = result.passed(),
            "load run finished"
        );

        Ok(result)
    }
}

fn unix_millis() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_millis())
}
