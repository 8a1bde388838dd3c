//! Threshold alerting for triage automation.
//!
//! `triage-alerts` evaluates health and metrics snapshots against
//! warning/critical thresholds and emits de-duplicated alerts:
//!
//! - **Cooldowns**: one alert per (component, metric) per cooldown window
//! - **Hourly ceiling**: a global cap on emitted alerts per hour
//! - **Channels**: log, generic webhook, chat webhook and email, dispatched
//!   concurrently with per-channel failure isolation
//! - **Queries**: active alerts, history with filters, resolution times
//!
//! Alert messages describe the metric and threshold in plain words; they
//! never carry probe error text, stack traces or credentials.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use triage_alerts::{AlertEngine, AlertEngineConfig, AlertFilter, EvaluationInput, LogChannel};
//! use triage_health::{ComponentHealth, HealthSnapshot};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> triage_alerts::Result<()> {
//! let engine = AlertEngine::new(AlertEngineConfig::default())?;
//! engine.add_channel(Arc::new(LogChannel::default()));
//!
//! let snapshot = HealthSnapshot::new(vec![ComponentHealth::unhealthy("api", "unreachable")]);
//! let alerts = engine.evaluate(EvaluationInput::Health(&snapshot)).await;
//! assert_eq!(alerts.len(), 1);
//! assert_eq!(engine.active_alerts(&AlertFilter::all()).len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/triage-alerts/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod engine;
pub mod error;
pub mod types;

// Re-export main types at crate root
pub use channels::{
    EmailChannel, EmailConfig, EmailMessage, LogChannel, MailTransport,
    NotificationChannel, SendFuture, SlackChannel, SlackConfig, UnconfiguredMailTransport,
    WebhookChannel, WebhookConfig, WebhookPayload,
};
pub use engine::{AlertEngine, AlertEngineConfig, AlertStats};
pub use error::{AlertError, Result};
pub use types::{
    Alert, AlertFilter, AlertKey, AlertLevel, ComparisonOperator, EvaluationInput, Observation,
    ThresholdRule, ANY_COMPONENT, STATUS_METRIC,
};
