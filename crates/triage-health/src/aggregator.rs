//! The health check aggregator.
//!
//! Probes of one cycle run as separate tasks with a shared time budget. A
//! probe that errors, panics or overruns is recorded as `unhealthy`; the
//! others are unaffected. Results are sorted by probe name before reduction,
//! so completion order never changes the snapshot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triage_metrics::TimeRange;

use crate::error::{HealthError, Result};
use crate::probe::HealthProbe;
use crate::types::{ComponentHealth, HealthSnapshot, HealthStatus};

/// Aggregator and built-in probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between cycles.
    pub interval_secs: u64,
    /// Per-probe time budget in milliseconds.
    pub probe_timeout_ms: u64,
    /// Snapshots kept for trend queries.
    pub history_size: usize,
    /// API probe: latency above this is degraded.
    pub api_latency_threshold_ms: u64,
    /// Analysis probe: self-test accuracy below this is degraded.
    pub accuracy_threshold: f64,
    /// Resource probe: memory percentage that is degraded.
    pub memory_degraded_percent: f64,
    /// Resource probe: memory percentage that is unhealthy.
    pub memory_unhealthy_percent: f64,
    /// Error probe: errors per minute that is degraded.
    pub error_rate_degraded_per_minute: f64,
    /// Error probe: errors per minute that is unhealthy.
    pub error_rate_unhealthy_per_minute: f64,
    /// Error probe: window the rate is measured over, in seconds.
    pub error_window_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            probe_timeout_ms: 5000,
            history_size: 100,
            api_latency_threshold_ms: 2000,
            accuracy_threshold: 0.85,
            memory_degraded_percent: 80.0,
            memory_unhealthy_percent: 95.0,
            error_rate_degraded_per_minute: 5.0,
            error_rate_unhealthy_per_minute: 20.0,
            error_window_secs: 300,
        }
    }
}

impl HealthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `HealthError::InvalidConfig` for zero intervals, an empty
    /// history, or thresholds out of order.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || self.probe_timeout_ms == 0 || self.error_window_secs == 0 {
            return Err(HealthError::invalid_config("intervals and timeouts must be positive"));
        }
        if self.history_size == 0 {
            return Err(HealthError::invalid_config("history_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(HealthError::invalid_config("accuracy_threshold must be in [0, 1]"));
        }
        if self.memory_degraded_percent > self.memory_unhealthy_percent {
            return Err(HealthError::invalid_config(
                "memory_degraded_percent must not exceed memory_unhealthy_percent",
            ));
        }
        if self.error_rate_degraded_per_minute > self.error_rate_unhealthy_per_minute {
            return Err(HealthError::invalid_config(
                "error_rate_degraded_per_minute must not exceed error_rate_unhealthy_per_minute",
            ));
        }
        Ok(())
    }

    /// Per-probe time budget.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Time between cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// One point of a component's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Snapshot time.
    pub taken_at: DateTime<Utc>,
    /// The component's status then.
    pub status: HealthStatus,
    /// The component's sampled metric then.
    pub sampled_metric: Option<f64>,
}

/// Runs probes and keeps a bounded history. Clones share the history.
#[derive(Clone)]
pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    config: HealthConfig,
    history: Arc<RwLock<VecDeque<HealthSnapshot>>>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("probes", &self.probe_names())
            .field("config", &self.config)
            .field("history_len", &self.history.read().len())
            .finish()
    }
}

impl HealthAggregator {
    /// Creates an aggregator with no probes.
    ///
    /// # Errors
    ///
    /// Returns `HealthError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: HealthConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            probes: Vec::new(),
            history: Arc::new(RwLock::new(VecDeque::with_capacity(config.history_size))),
            config,
        })
    }

    /// Adds a probe.
    ///
    /// # Errors
    ///
    /// Returns `HealthError::InvalidConfig` if a probe with the same name exists.
    pub fn add_probe(&mut self, probe: Arc<dyn HealthProbe>) -> Result<()> {
        if self.probes.iter().any(|p| p.name() == probe.name()) {
            return Err(HealthError::invalid_config(format!(
                "duplicate probe '{}'",
                probe.name()
            )));
        }
        self.probes.push(probe);
        Ok(())
    }

    /// Builder form of [`add_probe`](Self::add_probe).
    ///
    /// # Errors
    ///
    /// As [`add_probe`](Self::add_probe).
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Result<Self> {
        self.add_probe(probe)?;
        Ok(self)
    }

    /// Names of the registered probes, in registration order.
    #[must_use]
    pub fn probe_names(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.name().to_string()).collect()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Runs every probe once and records the snapshot.
    pub async fn run_cycle(&self) -> HealthSnapshot {
        let timeout = self.config.probe_timeout();

        let tasks = self.probes.iter().map(|probe| {
            let probe = Arc::clone(probe);
            let name = probe.name().to_string();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, probe.check()).await;
                (outcome, started.elapsed())
            });
            async move { (name, handle.await) }
        });

        let components = join_all(tasks)
            .await
            .into_iter()
            .map(|(name, joined)| {
                let (mut health, elapsed) = match joined {
                    Ok((Ok(Ok(health)), elapsed)) => (health, elapsed),
                    Ok((Ok(Err(e)), elapsed)) => (ComponentHealth::unhealthy(&name, e.to_string()), elapsed),
                    Ok((Err(_), elapsed)) => {
                        let err = HealthError::Timeout {
                            probe: name.clone(),
                            timeout_ms: self.config.probe_timeout_ms,
                        };
                        (ComponentHealth::unhealthy(&name, err.to_string()), elapsed)
                    }
                    Err(_) => {
                        let err = HealthError::Panicked { probe: name.clone() };
                        (ComponentHealth::unhealthy(&name, err.to_string()), Duration::ZERO)
                    }
                };
                health.name = name;
                health.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                health
            })
            .collect();

        let snapshot = HealthSnapshot::new(components);
        self.record(snapshot.clone());

        match snapshot.overall {
            HealthStatus::Healthy => debug!(probes = snapshot.components.len(), "health cycle healthy"),
            status => {
                let failing: Vec<&str> = snapshot
                    .components
                    .iter()
                    .filter(|c| c.status != HealthStatus::Healthy)
                    .map(|c| c.name.as_str())
                    .collect();
                warn!(status = %status, failing = ?failing, "health cycle not healthy");
            }
        }
        snapshot
    }

    fn record(&self, snapshot: HealthSnapshot) {
        let mut history = self.history.write();
        if history.len() == self.config.history_size {
            history.pop_front();
        }
        history.push_back(snapshot);
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<HealthSnapshot> {
        self.history.read().back().cloned()
    }

    /// Up to `limit` most recent snapshots, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<HealthSnapshot> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` most recent results for one component, oldest first.
    #[must_use]
    pub fn component_trend(&self, name: &str, limit: usize) -> Vec<TrendPoint> {
        let history = self.history.read();
        let mut points: Vec<TrendPoint> = history
            .iter()
            .rev()
            .filter_map(|snapshot| {
                snapshot.component(name).map(|c| TrendPoint {
                    taken_at: snapshot.taken_at,
                    status: c.status,
                    sampled_metric: c.sampled_metric,
                })
            })
            .take(limit)
            .collect();
        points.reverse();
        points
    }

    /// Share of snapshots in `range` whose overall status was healthy.
    ///
    /// Returns `None` when no snapshot falls in the range.
    #[must_use]
    pub fn availability(&self, range: TimeRange) -> Option<f64> {
        let history = self.history.read();
        let (total, healthy) = history
            .iter()
            .filter(|s| range.contains(s.taken_at.timestamp_millis()))
            .fold((0usize, 0usize), |(total, healthy), s| {
                (total + 1, healthy + usize::from(s.is_healthy()))
            });
        (total > 0).then(|| healthy as f64 / total as f64)
    }

    /// Runs cycles on the configured interval until `token` is cancelled,
    /// sending each snapshot to `sink`.
    pub fn spawn(&self, token: CancellationToken, sink: mpsc::Sender<HealthSnapshot>) -> JoinHandle<()> {
        let aggregator = self.clone();
        let period = self.config.interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), probes = aggregator.probes.len(), "health checks started");

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        let snapshot = tokio::select! {
                            () = token.cancelled() => break,
                            snapshot = aggregator.run_cycle() => snapshot,
                        };
                        if sink.send(snapshot).await.is_err() {
                            debug!("health snapshot receiver dropped");
                        }
                    }
                }
            }

            info!("health checks stopped");
        })
    }
}
