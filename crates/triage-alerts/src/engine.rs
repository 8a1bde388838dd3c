//! The alerting engine.
//!
//! [`AlertEngine::evaluate`] turns a health or metrics snapshot into alerts.
//! Each breach passes three gates in order:
//!
//! 1. the (component, metric) cooldown; an active cooldown suppresses it
//! 2. the hourly ceiling; a full counter suppresses it and logs a notice
//! 3. record as active, start the cooldown, count it, dispatch
//!
//! Gates 1 and 2 run under the cooldown lock with the counter mutex nested
//! inside, so concurrent evaluations cannot both pass for the same key or
//! push the counter past the ceiling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triage_metrics::TimeRange;
use uuid::Uuid;

use crate::channels::NotificationChannel;
use crate::error::{AlertError, Result};
use crate::types::{Alert, AlertFilter, AlertKey, AlertLevel, EvaluationInput, ThresholdRule};

/// Configuration for the alerting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertEngineConfig {
    /// Suppression window per (component, metric), in seconds.
    pub cooldown_secs: u64,
    /// Ceiling on emitted alerts per hour across all keys.
    pub max_alerts_per_hour: u64,
    /// Resolve active alerts whose observation is back within thresholds.
    pub auto_resolve: bool,
    /// How long resolved alerts stay queryable, in seconds.
    pub history_retention_secs: u64,
    /// Window of the metrics snapshot evaluated by the service, in seconds.
    pub metrics_window_secs: u64,
    /// Seconds between metrics evaluations by the service.
    pub evaluation_interval_secs: u64,
    /// Capacity of the subscriber broadcast channel.
    pub broadcast_capacity: usize,
    /// Threshold rules; first matching rule wins per observation.
    pub rules: Vec<ThresholdRule>,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 900,
            max_alerts_per_hour: 10_000,
            auto_resolve: true,
            history_retention_secs: 7 * 24 * 3600,
            metrics_window_secs: 300,
            evaluation_interval_secs: 60,
            broadcast_capacity: 256,
            rules: ThresholdRule::defaults(),
        }
    }
}

impl AlertEngineConfig {
    /// Validates the configuration and every rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` or `AlertError::InvalidRule`.
    pub fn validate(&self) -> Result<()> {
        if self.max_alerts_per_hour == 0 {
            return Err(AlertError::invalid_config("max_alerts_per_hour must be positive"));
        }
        if self.broadcast_capacity == 0 {
            return Err(AlertError::invalid_config("broadcast_capacity must be positive"));
        }
        if self.metrics_window_secs == 0 || self.evaluation_interval_secs == 0 {
            return Err(AlertError::invalid_config(
                "metrics_window_secs and evaluation_interval_secs must be positive",
            ));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Cooldown as a duration.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// History retention as a duration.
    #[must_use]
    pub const fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }
}

/// Counters reported by [`AlertEngine::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    /// Currently active alerts.
    pub active: usize,
    /// Alerts held in history, active or resolved.
    pub total: usize,
    /// Alerts emitted since start.
    pub emitted: u64,
    /// Alerts emitted in the current hourly window.
    pub emitted_this_hour: u64,
    /// Breaches suppressed by a cooldown.
    pub suppressed_cooldown: u64,
    /// Breaches suppressed by the hourly ceiling.
    pub suppressed_rate_limit: u64,
    /// Alerts resolved since start.
    pub resolved: u64,
    /// Channel deliveries that failed.
    pub notification_failures: u64,
    /// Active alerts by level.
    pub active_by_level: HashMap<AlertLevel, usize>,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: u64,
    suppressed_cooldown: u64,
    suppressed_rate_limit: u64,
    resolved: u64,
    notification_failures: u64,
}

#[derive(Debug, Default)]
struct AlertBook {
    active: HashMap<AlertKey, Uuid>,
    all: HashMap<Uuid, Alert>,
}

enum Admission {
    Admitted,
    Cooldown,
    RateLimited,
}

/// Evaluates snapshots, suppresses duplicates and dispatches alerts.
///
/// Clones share all state.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    config: Arc<AlertEngineConfig>,
    rules: Arc<RwLock<Vec<ThresholdRule>>>,
    book: Arc<RwLock<AlertBook>>,
    cooldowns: Arc<Mutex<HashMap<AlertKey, Instant>>>,
    hourly: Arc<Mutex<u64>>,
    counters: Arc<Mutex<Counters>>,
    channels: Arc<RwLock<Vec<Arc<dyn NotificationChannel>>>>,
    sender: broadcast::Sender<Alert>,
}

impl AlertEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: AlertEngineConfig) -> Result<Self> {
        config.validate()?;
        let (sender, _) = broadcast::channel(config.broadcast_capacity);
        Ok(Self {
            rules: Arc::new(RwLock::new(config.rules.clone())),
            config: Arc::new(config),
            book: Arc::new(RwLock::new(AlertBook::default())),
            cooldowns: Arc::new(Mutex::new(HashMap::new())),
            hourly: Arc::new(Mutex::new(0)),
            counters: Arc::new(Mutex::new(Counters::default())),
            channels: Arc::new(RwLock::new(Vec::new())),
            sender,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AlertEngineConfig {
        &self.config
    }

    // ============ Rules and channels ============

    /// Adds a rule, replacing any rule for the same (component, metric).
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule is invalid.
    pub fn set_rule(&self, rule: ThresholdRule) -> Result<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        rules.retain(|r| !(r.component == rule.component && r.metric == rule.metric));
        info!(component = %rule.component, metric = %rule.metric, "threshold rule set");
        rules.insert(0, rule);
        Ok(())
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> Vec<ThresholdRule> {
        self.rules.read().clone()
    }

    /// Adds a notification channel.
    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = %channel.name(), "added notification channel");
        self.channels.write().push(channel);
    }

    /// Names of registered channels.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.read().iter().map(|c| c.name().to_string()).collect()
    }

    /// Subscribes to emitted alerts.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }

    // ============ Evaluation ============

    /// Evaluates a snapshot and returns the alerts emitted.
    ///
    /// Observations within thresholds resolve their active alert when
    /// `auto_resolve` is on.
    pub async fn evaluate(&self, input: EvaluationInput<'_>) -> Vec<Alert> {
        let observations = input.observations();
        let rules = self.rules.read().clone();
        let mut seen = HashSet::new();
        let mut emitted = Vec::new();

        for observation in &observations {
            let Some(rule) = rules.iter().find(|r| r.matches(observation)) else {
                continue;
            };
            let key = observation.key();
            if !seen.insert(key.clone()) {
                continue;
            }

            let Some((level, threshold)) = rule.classify(observation.value) else {
                if self.config.auto_resolve {
                    self.resolve_key(&key, false);
                }
                continue;
            };

            let alert = Alert::new(observation, rule, level, threshold);
            match self.admit(&alert) {
                Admission::Admitted => emitted.push(alert),
                Admission::Cooldown => {
                    debug!(key = %key, "alert suppressed by cooldown");
                }
                Admission::RateLimited => {
                    warn!(
                        key = %key,
                        ceiling = self.config.max_alerts_per_hour,
                        "alert rate limit exceeded, alert suppressed"
                    );
                }
            }
        }

        if !emitted.is_empty() {
            self.dispatch(&emitted).await;
        }
        emitted
    }

    fn admit(&self, alert: &Alert) -> Admission {
        let key = alert.key();
        let now = Instant::now();

        let mut cooldowns = self.cooldowns.lock();
        if cooldowns.get(&key).is_some_and(|until| now < *until) {
            self.counters.lock().suppressed_cooldown += 1;
            return Admission::Cooldown;
        }

        {
            let mut hourly = self.hourly.lock();
            if *hourly >= self.config.max_alerts_per_hour {
                self.counters.lock().suppressed_rate_limit += 1;
                return Admission::RateLimited;
            }
            *hourly += 1;
        }

        cooldowns.insert(key.clone(), now + self.config.cooldown());

        let mut book = self.book.write();
        book.active.insert(key, alert.id);
        book.all.insert(alert.id, alert.clone());
        drop(book);
        drop(cooldowns);

        self.counters.lock().emitted += 1;
        info!(
            alert_id = %alert.id,
            level = %alert.level,
            component = %alert.component,
            metric = %alert.metric,
            "alert emitted"
        );
        Admission::Admitted
    }

    async fn dispatch(&self, alerts: &[Alert]) {
        for alert in alerts {
            // No subscribers is not an error.
            let _ = self.sender.send(alert.clone());
        }

        let channels: Vec<Arc<dyn NotificationChannel>> = self
            .channels
            .read()
            .iter()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();
        if channels.is_empty() {
            return;
        }

        let deliveries = alerts.iter().flat_map(|alert| {
            channels.iter().map(move |channel| async move {
                (channel.name().to_string(), alert.id, channel.send(alert).await)
            })
        });

        let mut failures = 0u64;
        for (channel, alert_id, outcome) in join_all(deliveries).await {
            if let Err(e) = outcome {
                failures += 1;
                warn!(channel = %channel, alert_id = %alert_id, error = %e, "alert delivery failed");
            }
        }
        if failures > 0 {
            self.counters.lock().notification_failures += failures;
        }
    }

    // ============ Resolution ============

    /// Resolves the active alert for (component, metric) and ends its
    /// cooldown early.
    ///
    /// Returns the resolved alert, or `None` if none was active.
    pub fn resolve(&self, component: &str, metric: &str) -> Option<Alert> {
        self.resolve_key(&AlertKey::new(component, metric), true)
    }

    fn resolve_key(&self, key: &AlertKey, clear_cooldown: bool) -> Option<Alert> {
        let resolved = {
            let mut book = self.book.write();
            book.active
                .remove(key)
                .and_then(|id| book.all.get_mut(&id))
                .and_then(|alert| alert.resolve(Utc::now()).then(|| alert.clone()))
        };
        if clear_cooldown {
            self.cooldowns.lock().remove(key);
        }
        if let Some(alert) = &resolved {
            self.counters.lock().resolved += 1;
            info!(alert_id = %alert.id, key = %key, auto = !clear_cooldown, "alert resolved");
        }
        resolved
    }

    // ============ Queries ============

    /// Active alerts matching the filter, most severe first then newest.
    #[must_use]
    pub fn active_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let book = self.book.read();
        let mut alerts: Vec<Alert> = book
            .active
            .values()
            .filter_map(|id| book.all.get(id))
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.level.cmp(&a.level).then(b.created_at.cmp(&a.created_at)));
        alerts
    }

    /// All retained alerts matching the filter, newest first.
    #[must_use]
    pub fn history(&self, filter: &AlertFilter) -> Vec<Alert> {
        let book = self.book.read();
        let mut alerts: Vec<Alert> = book.all.values().filter(|a| filter.matches(a)).cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    /// Mean time to resolution of alerts created in `range`.
    ///
    /// Returns `None` when no such alert has been resolved.
    #[must_use]
    pub fn average_resolution_time(&self, range: TimeRange) -> Option<Duration> {
        let book = self.book.read();
        let times: Vec<Duration> = book
            .all
            .values()
            .filter(|a| range.contains(a.created_at.timestamp_millis()))
            .filter_map(Alert::resolution_time)
            .collect();
        let count = u32::try_from(times.len()).ok().filter(|n| *n > 0)?;
        Some(times.iter().sum::<Duration>() / count)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> AlertStats {
        let emitted_this_hour = *self.hourly.lock();
        let book = self.book.read();
        let mut active_by_level = HashMap::new();
        for alert in book.active.values().filter_map(|id| book.all.get(id)) {
            *active_by_level.entry(alert.level).or_insert(0) += 1;
        }
        let counters = self.counters.lock();
        AlertStats {
            active: book.active.len(),
            total: book.all.len(),
            emitted: counters.emitted,
            emitted_this_hour,
            suppressed_cooldown: counters.suppressed_cooldown,
            suppressed_rate_limit: counters.suppressed_rate_limit,
            resolved: counters.resolved,
            notification_failures: counters.notification_failures,
            active_by_level,
        }
    }

    // ============ Maintenance ============

    /// Starts a new hourly window.
    pub fn reset_hourly_counter(&self) {
        let previous = std::mem::take(&mut *self.hourly.lock());
        debug!(previous, "hourly alert counter reset");
    }

    /// Drops resolved alerts older than `retention`, superseded alerts
    /// older than `retention`, and expired cooldowns. Returns the number of
    /// alerts removed.
    pub fn purge_history(&self, retention: Duration) -> usize {
        let cutoff = TimeDelta::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = {
            let mut book = self.book.write();
            let active: HashSet<Uuid> = book.active.values().copied().collect();
            let before = book.all.len();
            book.all.retain(|id, alert| {
                active.contains(id) || alert.resolved_at.unwrap_or(alert.created_at) >= cutoff
            });
            before - book.all.len()
        };

        let now = Instant::now();
        self.cooldowns.lock().retain(|_, until| *until > now);

        if removed > 0 {
            info!(removed, "purged alert history");
        }
        removed
    }

    /// Resets the hourly counter at each wall-clock hour and purges history,
    /// until `token` is cancelled.
    pub fn spawn_maintenance(&self, token: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            info!("alert maintenance started");
            loop {
                let wait = until_next_hour(Utc::now());
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {
                        engine.reset_hourly_counter();
                        engine.purge_history(engine.config.history_retention());
                    }
                }
            }
            info!("alert maintenance stopped");
        })
    }
}

fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let into_hour = Duration::from_secs(u64::from(now.minute() * 60 + now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(3600).saturating_sub(into_hour).max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::tests::{FailingChannel, RecordingChannel};
    use crate::types::{ComparisonOperator, STATUS_METRIC};
    use chrono::TimeZone;
    use triage_health::{ComponentHealth, HealthSnapshot};
    use triage_metrics::{ApiUsageSummary, MetricsSnapshot};

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertEngineConfig::default()).unwrap()
    }

    fn engine_with(config: AlertEngineConfig) -> AlertEngine {
        AlertEngine::new(config).unwrap()
    }

    fn metrics_with_error_rate(error_rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            taken_at: Utc::now(),
            window_secs: 300,
            labeling: Default::default(),
            api: ApiUsageSummary {
                count: 100,
                error_rate: Some(error_rate),
                ..Default::default()
            },
            performance: Default::default(),
            errors: Default::default(),
            system: Default::default(),
        }
    }

    fn unhealthy_api() -> HealthSnapshot {
        HealthSnapshot::new(vec![
            ComponentHealth::unhealthy("api", "probe 'api' timed out after 5000ms"),
            ComponentHealth::healthy("analysis"),
        ])
    }

    mod config_tests {
        use super::*;

        #[test]
        fn defaults() {
            let config = AlertEngineConfig::default();
            assert_eq!(config.cooldown(), Duration::from_secs(15 * 60));
            assert_eq!(config.max_alerts_per_hour, 10_000);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn zero_ceiling_rejected() {
            let config = AlertEngineConfig {
                max_alerts_per_hour: 0,
                ..Default::default()
            };
            assert!(AlertEngine::new(config).is_err());
        }

        #[test]
        fn invalid_rule_rejected() {
            let mut config = AlertEngineConfig::default();
            config.rules[0].warning = Some(f64::NAN);
            assert!(AlertEngine::new(config).is_err());
        }

        #[test]
        fn until_next_hour_is_within_an_hour() {
            let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 59, 30).unwrap();
            assert_eq!(until_next_hour(at), Duration::from_secs(30));
            let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            assert_eq!(until_next_hour(at), Duration::from_secs(3600));
        }
    }

    mod evaluation_tests {
        use super::*;

        #[tokio::test]
        async fn breach_emits_alert_with_plain_message() {
            let engine = engine();
            let alerts = engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.3)))
                .await;
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].level, AlertLevel::Critical);
            assert_eq!(alerts[0].threshold, 0.25);
            assert_eq!(
                alerts[0].message,
                "api error rate is 0.30, above the critical threshold of 0.25"
            );
        }

        #[tokio::test]
        async fn health_breach_does_not_leak_probe_errors() {
            let engine = engine();
            let alerts = engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await;
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].metric, STATUS_METRIC);
            assert!(!alerts[0].message.contains("timed out"));
        }

        #[tokio::test]
        async fn within_threshold_emits_nothing() {
            let engine = engine();
            let alerts = engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.01)))
                .await;
            assert!(alerts.is_empty());
        }

        #[tokio::test]
        async fn custom_rule_replaces_default() {
            let engine = engine();
            engine
                .set_rule(
                    ThresholdRule::new("api", "error_rate", ComparisonOperator::GreaterThan, Some(0.5), None)
                        .unwrap(),
                )
                .unwrap();
            let alerts = engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.3)))
                .await;
            assert!(alerts.is_empty());
        }
    }

    mod cooldown_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn double_trigger_dispatches_once() {
            let engine = engine();
            let channel = RecordingChannel::new("webhook");
            engine.add_channel(channel.clone());

            let snapshot = metrics_with_error_rate(0.3);
            engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;
            let second = engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;

            assert!(second.is_empty());
            assert_eq!(channel.count(), 1);
            assert_eq!(engine.stats().suppressed_cooldown, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn refires_after_cooldown() {
            let engine = engine();
            let snapshot = metrics_with_error_rate(0.3);
            engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;

            tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;
            let again = engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;
            assert_eq!(again.len(), 1);
            assert_eq!(engine.active_alerts(&AlertFilter::all()).len(), 1);
            assert_eq!(engine.history(&AlertFilter::all()).len(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn explicit_resolve_cancels_cooldown() {
            let engine = engine();
            let snapshot = metrics_with_error_rate(0.3);
            engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;

            let resolved = engine.resolve("api", "error_rate").unwrap();
            assert!(resolved.resolved);
            assert!(resolved.resolved_at.is_some());
            assert!(engine.resolve("api", "error_rate").is_none());

            let again = engine.evaluate(EvaluationInput::Metrics(&snapshot)).await;
            assert_eq!(again.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn auto_resolve_keeps_cooldown() {
            let engine = engine();
            engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.3)))
                .await;
            engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.0)))
                .await;
            assert!(engine.active_alerts(&AlertFilter::all()).is_empty());
            assert_eq!(engine.stats().resolved, 1);

            let again = engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.3)))
                .await;
            assert!(again.is_empty());
        }
    }

    mod rate_limit_tests {
        use super::*;

        #[tokio::test]
        async fn ten_thousand_and_first_alert_is_suppressed() {
            let engine = engine_with(AlertEngineConfig {
                cooldown_secs: 0,
                auto_resolve: false,
                ..Default::default()
            });
            let snapshot = unhealthy_api();

            for _ in 0..10_000 {
                let alerts = engine.evaluate(EvaluationInput::Health(&snapshot)).await;
                assert_eq!(alerts.len(), 1);
            }
            let alerts = engine.evaluate(EvaluationInput::Health(&snapshot)).await;
            assert!(alerts.is_empty());

            let stats = engine.stats();
            assert_eq!(stats.emitted, 10_000);
            assert_eq!(stats.emitted_this_hour, 10_000);
            assert_eq!(stats.suppressed_rate_limit, 1);
        }

        #[tokio::test]
        async fn reset_opens_a_new_window() {
            let engine = engine_with(AlertEngineConfig {
                cooldown_secs: 0,
                max_alerts_per_hour: 2,
                ..Default::default()
            });
            let snapshot = unhealthy_api();
            for _ in 0..3 {
                engine.evaluate(EvaluationInput::Health(&snapshot)).await;
            }
            assert_eq!(engine.stats().suppressed_rate_limit, 1);

            engine.reset_hourly_counter();
            let alerts = engine.evaluate(EvaluationInput::Health(&snapshot)).await;
            assert_eq!(alerts.len(), 1);
        }

        #[tokio::test]
        async fn concurrent_evaluations_never_exceed_ceiling() {
            let engine = engine_with(AlertEngineConfig {
                cooldown_secs: 0,
                max_alerts_per_hour: 50,
                ..Default::default()
            });
            let handles: Vec<_> = (0..200)
                .map(|_| {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await.len()
                    })
                })
                .collect();
            let mut emitted = 0;
            for handle in handles {
                emitted += handle.await.unwrap();
            }
            assert_eq!(emitted, 50);
            assert_eq!(engine.stats().suppressed_rate_limit, 150);
        }
    }

    mod dispatch_tests {
        use super::*;

        #[tokio::test]
        async fn failing_channel_does_not_block_others() {
            let engine = engine();
            let webhook = RecordingChannel::new("webhook");
            engine.add_channel(Arc::new(FailingChannel));
            engine.add_channel(webhook.clone());

            let alerts = engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await;
            assert_eq!(alerts.len(), 1);
            assert_eq!(webhook.count(), 1);
            assert_eq!(engine.stats().notification_failures, 1);
            assert_eq!(engine.channel_names(), ["email", "webhook"]);
        }

        #[tokio::test]
        async fn subscribers_receive_emitted_alerts() {
            let engine = engine();
            let mut rx = engine.subscribe();
            engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await;
            let alert = rx.recv().await.unwrap();
            assert_eq!(alert.component, "api");
        }
    }

    mod query_tests {
        use super::*;

        #[tokio::test]
        async fn filters_and_resolution_time() {
            let engine = engine();
            engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await;
            engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.1)))
                .await;

            assert_eq!(engine.active_alerts(&AlertFilter::all()).len(), 2);
            assert_eq!(
                engine
                    .active_alerts(&AlertFilter::all().level(AlertLevel::Warning))
                    .len(),
                1
            );
            assert!(engine.average_resolution_time(TimeRange::last_minutes(5)).is_none());

            engine.resolve("api", STATUS_METRIC).unwrap();
            assert!(engine.average_resolution_time(TimeRange::last_minutes(5)).is_some());
            assert_eq!(engine.history(&AlertFilter::all().component("api")).len(), 2);

            let stats = engine.stats();
            assert_eq!(stats.active, 1);
            assert_eq!(stats.active_by_level.get(&AlertLevel::Warning), Some(&1));
        }

        #[tokio::test]
        async fn purge_drops_only_old_resolved_alerts() {
            let engine = engine();
            engine.evaluate(EvaluationInput::Health(&unhealthy_api())).await;
            engine
                .evaluate(EvaluationInput::Metrics(&metrics_with_error_rate(0.3)))
                .await;
            engine.resolve("api", STATUS_METRIC).unwrap();

            assert_eq!(engine.purge_history(Duration::from_secs(3600)), 0);
            assert_eq!(engine.purge_history(Duration::ZERO), 1);
            assert_eq!(engine.history(&AlertFilter::all()).len(), 1);
        }
    }
}
