//! Component wiring and background task lifecycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triage_alerts::{Alert, AlertEngine, AlertFilter, AlertStats, EvaluationInput, NotificationChannel};
use triage_analysis::{Analyzer, SelfTestCorpus};
use triage_client::{RateLimitState, RateLimitedClient, TicketingApi};
use triage_health::{
    AnalysisProbe, ApiProbe, ErrorRateProbe, HealthAggregator, HealthSnapshot, MemorySource,
    ResourceProbe, SysinfoMemory,
};
use triage_metrics::{MetricsCollector, MetricsSnapshot, TimeRange};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::pipeline::TriagePipeline;

/// Snapshots buffered between the health loop and alert evaluation.
const HEALTH_QUEUE_DEPTH: usize = 16;

/// Assembles a [`Monitor`], optionally overriding the provider, memory
/// source and channels from the configuration.
pub struct MonitorBuilder {
    config: MonitorConfig,
    api: Option<Arc<dyn TicketingApi>>,
    memory: Option<Arc<dyn MemorySource>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl std::fmt::Debug for MonitorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorBuilder")
            .field("config", &self.config)
            .field("extra_channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl MonitorBuilder {
    /// Starts from a configuration.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            api: None,
            memory: None,
            channels: Vec::new(),
        }
    }

    /// Uses `api` instead of the provider the configuration describes.
    #[must_use]
    pub fn with_api(mut self, api: Arc<dyn TicketingApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Uses `source` instead of host memory readings.
    #[must_use]
    pub fn with_memory_source(mut self, source: Arc<dyn MemorySource>) -> Self {
        self.memory = Some(source);
        self
    }

    /// Adds a channel on top of the configured ones.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Builds every component without starting background work.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a component
    /// cannot be constructed.
    pub fn build(self) -> Result<Monitor> {
        let config = self.config;
        config.validate()?;

        let api = match self.api {
            Some(api) => api,
            None => config.build_api()?,
        };
        let metrics = MetricsCollector::with_config(config.metrics.clone())?;
        let client = RateLimitedClient::new(api, config.client.clone())?;
        let analyzer = Arc::new(Analyzer::new(config.analysis.clone())?);
        let memory: Arc<dyn MemorySource> = match self.memory {
            Some(memory) => memory,
            None => Arc::new(SysinfoMemory::new()),
        };

        let hc = &config.health;
        let health = HealthAggregator::new(hc.clone())?
            .with_probe(Arc::new(ApiProbe::new(
                client.clone(),
                Duration::from_millis(hc.api_latency_threshold_ms),
            )))?
            .with_probe(Arc::new(AnalysisProbe::new(
                analyzer.clone(),
                SelfTestCorpus::builtin(),
                hc.accuracy_threshold,
            )))?
            .with_probe(Arc::new(
                ResourceProbe::new(memory, hc.memory_degraded_percent, hc.memory_unhealthy_percent)
                    .with_metrics(metrics.clone()),
            ))?
            .with_probe(Arc::new(ErrorRateProbe::new(
                metrics.clone(),
                Duration::from_secs(hc.error_window_secs),
                hc.error_rate_degraded_per_minute,
                hc.error_rate_unhealthy_per_minute,
            )))?;

        let alerts = AlertEngine::new(config.alerts.clone())?;
        for channel in config.build_channels()?.into_iter().chain(self.channels) {
            alerts.add_channel(channel);
        }

        let token = CancellationToken::new();
        let pipeline = TriagePipeline::new(analyzer.clone(), client.clone(), metrics.clone(), token.clone());

        info!(
            dry_run = config.dry_run,
            probes = ?health.probe_names(),
            channels = ?alerts.channel_names(),
            "monitor assembled"
        );

        Ok(Monitor {
            config,
            metrics,
            client,
            analyzer,
            health,
            alerts,
            pipeline,
            token,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Builds the monitor and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if [`build`](Self::build) fails.
    pub fn start(self) -> Result<Monitor> {
        let monitor = self.build()?;
        monitor.spawn_tasks();
        Ok(monitor)
    }
}

/// Point-in-time view of the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Most recent health cycle.
    pub health: Option<HealthSnapshot>,
    /// Share of healthy cycles over the last day.
    pub availability: Option<f64>,
    /// Last observed provider quota.
    pub quota: Option<RateLimitState>,
    /// Headline metrics over the alerting window.
    pub metrics: MetricsSnapshot,
    /// Alert counters.
    pub alert_stats: AlertStats,
    /// Active alerts, most severe first.
    pub active_alerts: Vec<Alert>,
}

/// The running service: every component plus its background tasks.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    metrics: MetricsCollector,
    client: RateLimitedClient,
    analyzer: Arc<Analyzer>,
    health: HealthAggregator,
    alerts: AlertEngine,
    pipeline: TriagePipeline,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Builds a monitor from `config` and starts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a component
    /// cannot be constructed.
    pub fn start(config: MonitorConfig) -> Result<Self> {
        MonitorBuilder::new(config).start()
    }

    fn spawn_tasks(&self) {
        let mut tasks = self.tasks.lock();

        tasks.push(self.metrics.spawn_compaction(self.token.child_token()));

        let (tx, rx) = mpsc::channel(HEALTH_QUEUE_DEPTH);
        tasks.push(self.health.spawn(self.token.child_token(), tx));
        tasks.push(spawn_health_alerts(self.alerts.clone(), rx));

        tasks.push(spawn_metrics_alerts(
            self.alerts.clone(),
            self.metrics.clone(),
            self.token.child_token(),
        ));

        tasks.push(self.alerts.spawn_maintenance(self.token.child_token()));

        info!(tasks = tasks.len(), "monitor started");
    }

    /// Stops every background task and waits for them to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("monitor stopped");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the configuration the monitor was built from.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Returns the health aggregator.
    #[must_use]
    pub const fn health(&self) -> &HealthAggregator {
        &self.health
    }

    /// Returns the alerting engine.
    #[must_use]
    pub const fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Returns the metrics collector.
    #[must_use]
    pub const fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Returns the rate-limited provider client.
    #[must_use]
    pub const fn client(&self) -> &RateLimitedClient {
        &self.client
    }

    /// Returns the analyzer.
    #[must_use]
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Returns the issue pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &TriagePipeline {
        &self.pipeline
    }

    /// Collects a status report for display.
    #[must_use]
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            health: self.health.latest(),
            availability: self.health.availability(TimeRange::last_hours(24)),
            quota: self.client.last_state(),
            metrics: self
                .metrics
                .snapshot(Duration::from_secs(self.config.alerts.metrics_window_secs)),
            alert_stats: self.alerts.stats(),
            active_alerts: self.alerts.active_alerts(&AlertFilter::all()),
        }
    }
}

/// Evaluates each health snapshot until the health loop drops its sender.
fn spawn_health_alerts(alerts: AlertEngine, mut rx: mpsc::Receiver<HealthSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let emitted = alerts.evaluate(EvaluationInput::Health(&snapshot)).await;
            debug!(
                overall = snapshot.overall.as_str(),
                emitted = emitted.len(),
                "health snapshot evaluated"
            );
        }
        debug!("health alert evaluation stopped");
    })
}

fn spawn_metrics_alerts(
    alerts: AlertEngine,
    metrics: MetricsCollector,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = Duration::from_secs(alerts.config().evaluation_interval_secs);
    let window = Duration::from_secs(alerts.config().metrics_window_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "metrics alerting started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = metrics.snapshot(window);
                    let emitted = alerts.evaluate(EvaluationInput::Metrics(&snapshot)).await;
                    if !emitted.is_empty() {
                        debug!(emitted = emitted.len(), "metrics snapshot evaluated");
                    }
                }
            }
        }

        info!("metrics alerting stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{IssueEvent, IssueEventKind};
    use triage_alerts::AlertLevel;
    use triage_client::{ApiOperation, MockTicketingApi};
    use triage_health::{HealthStatus, MemorySample};

    struct FixedMemory(u64, u64);

    impl MemorySource for FixedMemory {
        fn sample(&self) -> triage_health::Result<MemorySample> {
            Ok(MemorySample {
                used_bytes: self.0,
                total_bytes: self.1,
                uptime_secs: 60,
            })
        }
    }

    fn builder(used: u64) -> MonitorBuilder {
        MonitorBuilder::new(MonitorConfig::default())
            .with_memory_source(Arc::new(FixedMemory(used, 100)))
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn start_registers_components() {
            let monitor = builder(10).start().unwrap();

            assert_eq!(monitor.health().probe_names(), ["api", "analysis", "resources", "errors"]);
            assert_eq!(monitor.alerts().channel_names(), ["log"]);
            assert!(!monitor.is_shutting_down());

            monitor.shutdown().await;
            assert!(monitor.is_shutting_down());
        }

        #[tokio::test(start_paused = true)]
        async fn shutdown_is_idempotent() {
            let monitor = builder(10).start().unwrap();
            monitor.shutdown().await;
            monitor.shutdown().await;
            assert!(monitor.tasks.lock().is_empty());
        }

        #[test]
        fn invalid_config_is_rejected() {
            let mut config = MonitorConfig::default();
            config.alerts.max_alerts_per_hour = 0;
            assert!(MonitorBuilder::new(config).build().is_err());
        }
    }

    mod loop_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn healthy_cycle_raises_nothing() {
            let monitor = builder(10).start().unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;

            let latest = monitor.health().latest().unwrap();
            assert_eq!(latest.overall, HealthStatus::Healthy);
            assert!(monitor.alerts().active_alerts(&AlertFilter::all()).is_empty());

            monitor.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn unhealthy_component_raises_critical_alert() {
            let monitor = builder(99).start().unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;

            let active = monitor
                .alerts()
                .active_alerts(&AlertFilter::all().component("resources"));
            assert!(!active.is_empty());
            assert!(active.iter().all(|a| a.level == AlertLevel::Critical));

            monitor.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn extra_channel_receives_alerts() {
            let monitor = builder(99)
                .with_channel(Arc::new(triage_alerts::LogChannel::new("audit")))
                .start()
                .unwrap();
            assert_eq!(monitor.alerts().channel_names(), ["log", "audit"]);
            monitor.shutdown().await;
        }
    }

    mod query_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn pipeline_uses_configured_api() {
            let api = Arc::new(MockTicketingApi::new());
            let monitor = builder(10).with_api(api.clone()).build().unwrap();

            let event = IssueEvent::new(
                5,
                IssueEventKind::Opened,
                "Typo in README",
                Some("There is a small typo in the installation docs.".to_string()),
            );
            monitor.pipeline().process_issue(&event).await.unwrap();

            assert!(matches!(
                api.executed().as_slice(),
                [ApiOperation::AddLabels { number: 5, .. }]
            ));
            assert!(monitor.client().last_state().is_some());
        }

        #[tokio::test(start_paused = true)]
        async fn status_report_serializes() {
            let monitor = builder(10).start().unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;

            let report = monitor.status_report();
            assert!(report.health.is_some());
            assert_eq!(report.alert_stats.active, 0);

            let json = serde_json::to_value(&report).unwrap();
            assert!(json.get("alert_stats").is_some());

            monitor.shutdown().await;
        }
    }
}
