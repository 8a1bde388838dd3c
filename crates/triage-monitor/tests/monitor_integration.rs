//! End-to-end tests across the pipeline, health checks and alerting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use triage_alerts::{AlertFilter, AlertLevel, EvaluationInput};
use triage_client::{ApiOperation, ClientError, MockTicketingApi, RateLimitState};
use triage_health::{HealthStatus, MemorySample, MemorySource};
use triage_monitor::{IssueEvent, IssueEventKind, Monitor, MonitorBuilder, MonitorConfig};

struct QuietHost;

impl MemorySource for QuietHost {
    fn sample(&self) -> triage_health::Result<MemorySample> {
        Ok(MemorySample {
            used_bytes: 20,
            total_bytes: 100,
            uptime_secs: 3600,
        })
    }
}

fn monitor_with(api: Arc<MockTicketingApi>) -> Monitor {
    MonitorBuilder::new(MonitorConfig::default())
        .with_api(api)
        .with_memory_source(Arc::new(QuietHost))
        .build()
        .unwrap()
}

fn bug_report(number: u64) -> IssueEvent {
    IssueEvent::new(
        number,
        IssueEventKind::Opened,
        "API endpoint returns 500",
        Some("The /users endpoint fails after deploy.".to_string()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_alerts_once_per_cooldown() {
    let api = Arc::new(MockTicketingApi::new().with_latency(Duration::from_secs(30)));
    let monitor = monitor_with(api);

    let first = monitor.health().run_cycle().await;
    let api_health = first.component("api").unwrap();
    assert_eq!(api_health.status, HealthStatus::Unhealthy);

    let emitted = monitor.alerts().evaluate(EvaluationInput::Health(&first)).await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].component, "api");
    assert_eq!(emitted[0].level, AlertLevel::Critical);
    assert!(!emitted[0].message.contains("timed out"));

    let second = monitor.health().run_cycle().await;
    let emitted = monitor.alerts().evaluate(EvaluationInput::Health(&second)).await;
    assert!(emitted.is_empty());

    let stats = monitor.alerts().stats();
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.suppressed_cooldown, 1);
    assert_eq!(stats.active, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_provider_raises_error_rate_alert() {
    let api = Arc::new(MockTicketingApi::new());
    for _ in 0..10 {
        api.push_response(Err(ClientError::Authentication {
            operation: "add_labels",
        }));
    }
    let monitor = monitor_with(api);

    for number in 1..=10 {
        assert!(monitor.pipeline().process_issue(&bug_report(number)).await.is_err());
    }

    let snapshot = monitor.metrics().snapshot(Duration::from_secs(300));
    let emitted = monitor.alerts().evaluate(EvaluationInput::Metrics(&snapshot)).await;

    let error_rate = emitted
        .iter()
        .find(|a| a.component == "api" && a.metric == "error_rate")
        .unwrap();
    assert_eq!(error_rate.level, AlertLevel::Critical);
    assert!(error_rate.message.contains("above the critical threshold"));

    let active = monitor
        .alerts()
        .active_alerts(&AlertFilter::all().level(AlertLevel::Critical));
    assert!(!active.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_operator_resolution_is_tracked() {
    let api = Arc::new(MockTicketingApi::new());
    api.push_response(Err(ClientError::Authentication {
        operation: "add_labels",
    }));
    let monitor = monitor_with(api);

    assert!(monitor.pipeline().process_issue(&bug_report(1)).await.is_err());
    let snapshot = monitor.metrics().snapshot(Duration::from_secs(300));
    monitor.alerts().evaluate(EvaluationInput::Metrics(&snapshot)).await;

    let api_alerts = AlertFilter::all().component("api");
    assert_eq!(monitor.alerts().active_alerts(&api_alerts).len(), 1);

    let resolved = monitor.alerts().resolve("api", "error_rate").unwrap();
    assert!(resolved.resolved);
    assert!(monitor.alerts().active_alerts(&api_alerts).is_empty());
    assert_eq!(monitor.alerts().history(&api_alerts).len(), 1);
    assert_eq!(monitor.alerts().stats().resolved, 1);
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_delays_labeling_until_reset() {
    let api = Arc::new(MockTicketingApi::new());
    let reset_at = Utc::now() + TimeDelta::seconds(60);
    api.push_rate_limit(RateLimitState::new(5000, 5, reset_at));
    let monitor = monitor_with(api.clone());

    let started = tokio::time::Instant::now();
    let outcome = monitor.pipeline().process_issue(&bug_report(11)).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(59));
    assert!(!outcome.applied_labels.is_empty());
    assert!(matches!(
        api.executed().as_slice(),
        [ApiOperation::AddLabels { number: 11, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_started_service_stops_cleanly() {
    let api = Arc::new(MockTicketingApi::new());
    let monitor = MonitorBuilder::new(MonitorConfig::default())
        .with_api(api)
        .with_memory_source(Arc::new(QuietHost))
        .start()
        .unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(monitor.health().history(10).len() >= 2);

    monitor.shutdown().await;
    let before = monitor.health().history(100).len();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(monitor.health().history(100).len(), before);
}
