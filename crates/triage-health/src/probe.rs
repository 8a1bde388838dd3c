//! Health probe trait and the built-in probes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::System;
use triage_analysis::{run_self_test, Analyzer, SelfTestCorpus};
use triage_client::RateLimitedClient;
use triage_metrics::{EventData, MetricsCollector, SystemEvent, TimeRange};

use crate::error::{HealthError, Result};
use crate::types::{ComponentHealth, HealthStatus};

/// Boxed future returned by [`HealthProbe::check`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ComponentHealth>> + Send + 'a>>;

/// One self-contained health check.
///
/// Implementations may return an error; the aggregator turns it into an
/// `unhealthy` entry.
pub trait HealthProbe: Send + Sync {
    /// Probe name, unique within an aggregator.
    fn name(&self) -> &str;

    /// Runs the check.
    fn check(&self) -> ProbeFuture<'_>;
}

/// Checks provider reachability, latency and remaining quota.
#[derive(Debug, Clone)]
pub struct ApiProbe {
    client: RateLimitedClient,
    latency_threshold: Duration,
}

impl ApiProbe {
    /// Probe name.
    pub const NAME: &'static str = "api";

    /// Creates the probe.
    #[must_use]
    pub const fn new(client: RateLimitedClient, latency_threshold: Duration) -> Self {
        Self {
            client,
            latency_threshold,
        }
    }
}

impl HealthProbe for ApiProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let probe = self
                .client
                .probe()
                .await
                .map_err(|e| HealthError::probe_failed(Self::NAME, e.to_string()))?;

            let latency_ms = probe.latency.as_secs_f64() * 1000.0;
            let mut health = ComponentHealth::healthy(Self::NAME).with_metric(latency_ms);

            if probe.latency > self.latency_threshold {
                health.escalate(
                    HealthStatus::Degraded,
                    format!(
                        "quota endpoint latency {latency_ms:.0}ms exceeds {}ms",
                        self.latency_threshold.as_millis()
                    ),
                );
            }
            if !probe.within_buffer {
                health.escalate(
                    HealthStatus::Degraded,
                    format!(
                        "quota usage {:.0}% exceeds buffer ({} of {} calls left)",
                        probe.state.used_fraction() * 100.0,
                        probe.state.remaining(),
                        probe.state.limit()
                    ),
                );
            }
            Ok(health)
        })
    }
}

/// Runs the analyzer against a labeled corpus.
#[derive(Debug, Clone)]
pub struct AnalysisProbe {
    analyzer: Arc<Analyzer>,
    corpus: SelfTestCorpus,
    accuracy_threshold: f64,
}

impl AnalysisProbe {
    /// Probe name.
    pub const NAME: &'static str = "analysis";

    /// Creates the probe.
    #[must_use]
    pub const fn new(analyzer: Arc<Analyzer>, corpus: SelfTestCorpus, accuracy_threshold: f64) -> Self {
        Self {
            analyzer,
            corpus,
            accuracy_threshold,
        }
    }
}

impl HealthProbe for AnalysisProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let report = run_self_test(&self.analyzer, &self.corpus)
                .map_err(|e| HealthError::probe_failed(Self::NAME, e.to_string()))?;

            let mut health = ComponentHealth::healthy(Self::NAME).with_metric(report.accuracy);
            if report.accuracy < self.accuracy_threshold {
                health.escalate(
                    HealthStatus::Degraded,
                    format!(
                        "self-test accuracy {:.2} below {:.2} ({} of {} cases passed)",
                        report.accuracy, self.accuracy_threshold, report.passed, report.total
                    ),
                );
            }
            Ok(health)
        })
    }
}

/// A memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Bytes in use.
    pub used_bytes: u64,
    /// Bytes installed.
    pub total_bytes: u64,
    /// Host uptime.
    pub uptime_secs: u64,
}

/// Source of memory readings.
pub trait MemorySource: Send + Sync {
    /// Takes a reading.
    ///
    /// # Errors
    ///
    /// Returns an error if memory cannot be read.
    fn sample(&self) -> Result<MemorySample>;
}

/// Reads host memory through `sysinfo`.
pub struct SysinfoMemory {
    system: Mutex<System>,
}

impl SysinfoMemory {
    /// Creates the source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysinfoMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoMemory").finish_non_exhaustive()
    }
}

impl MemorySource for SysinfoMemory {
    fn sample(&self) -> Result<MemorySample> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(HealthError::probe_failed(
                ResourceProbe::NAME,
                "total memory reported as zero",
            ));
        }
        Ok(MemorySample {
            used_bytes: system.used_memory().min(total_bytes),
            total_bytes,
            uptime_secs: System::uptime(),
        })
    }
}

/// Checks memory usage against two thresholds.
#[derive(Clone)]
pub struct ResourceProbe {
    source: Arc<dyn MemorySource>,
    degraded_percent: f64,
    unhealthy_percent: f64,
    metrics: Option<MetricsCollector>,
}

impl std::fmt::Debug for ResourceProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProbe")
            .field("degraded_percent", &self.degraded_percent)
            .field("unhealthy_percent", &self.unhealthy_percent)
            .finish_non_exhaustive()
    }
}

impl ResourceProbe {
    /// Probe name.
    pub const NAME: &'static str = "resources";

    /// Creates the probe.
    #[must_use]
    pub fn new(source: Arc<dyn MemorySource>, degraded_percent: f64, unhealthy_percent: f64) -> Self {
        Self {
            source,
            degraded_percent,
            unhealthy_percent,
            metrics: None,
        }
    }

    /// Records every reading as a system event.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl HealthProbe for ResourceProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let sample = self.source.sample()?;
            if sample.total_bytes == 0 {
                return Err(HealthError::probe_failed(
                    Self::NAME,
                    "total memory reported as zero",
                ));
            }
            let percent = sample.used_bytes as f64 / sample.total_bytes as f64 * 100.0;

            if let Some(metrics) = &self.metrics {
                let recorded = metrics.record_now(EventData::System(SystemEvent {
                    memory_used_bytes: sample.used_bytes,
                    memory_total_bytes: sample.total_bytes,
                    uptime_secs: sample.uptime_secs,
                }));
                if let Err(e) = recorded {
                    tracing::debug!(error = %e, "system sample rejected");
                }
            }

            let mut health = ComponentHealth::healthy(Self::NAME).with_metric(percent);
            if percent >= self.unhealthy_percent {
                health.escalate(
                    HealthStatus::Unhealthy,
                    format!("memory usage {percent:.1}% at or above {:.0}%", self.unhealthy_percent),
                );
            } else if percent >= self.degraded_percent {
                health.escalate(
                    HealthStatus::Degraded,
                    format!("memory usage {percent:.1}% at or above {:.0}%", self.degraded_percent),
                );
            }
            Ok(health)
        })
    }
}

/// Checks the recorded error rate.
#[derive(Debug, Clone)]
pub struct ErrorRateProbe {
    metrics: MetricsCollector,
    window: Duration,
    degraded_per_minute: f64,
    unhealthy_per_minute: f64,
}

impl ErrorRateProbe {
    /// Probe name.
    pub const NAME: &'static str = "errors";

    /// Creates the probe.
    #[must_use]
    pub const fn new(
        metrics: MetricsCollector,
        window: Duration,
        degraded_per_minute: f64,
        unhealthy_per_minute: f64,
    ) -> Self {
        Self {
            metrics,
            window,
            degraded_per_minute,
            unhealthy_per_minute,
        }
    }
}

impl HealthProbe for ErrorRateProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let range = TimeRange::last_millis(self.window.as_millis() as i64);
            let summary = self.metrics.errors(range);
            let Some(rate) = summary.errors_per_minute else {
                return Ok(ComponentHealth::healthy(Self::NAME));
            };

            let mut health = ComponentHealth::healthy(Self::NAME).with_metric(rate);
            if rate >= self.unhealthy_per_minute {
                health.escalate(
                    HealthStatus::Unhealthy,
                    format!("{rate:.1} errors/minute at or above {:.1}", self.unhealthy_per_minute),
                );
            } else if rate >= self.degraded_per_minute {
                health.escalate(
                    HealthStatus::Degraded,
                    format!("{rate:.1} errors/minute at or above {:.1}", self.degraded_per_minute),
                );
            }
            Ok(health)
        })
    }
}
