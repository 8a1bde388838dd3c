//! Error types for the monitoring service.

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while configuring or running the service.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider call failed.
    #[error(transparent)]
    Client(#[from] triage_client::ClientError),

    /// Analysis setup failed.
    #[error(transparent)]
    Analysis(#[from] triage_analysis::AnalysisError),

    /// Metrics recording or setup failed.
    #[error(transparent)]
    Metrics(#[from] triage_metrics::MetricsError),

    /// Health aggregator setup failed.
    #[error(transparent)]
    Health(#[from] triage_health::HealthError),

    /// Alerting setup failed.
    #[error(transparent)]
    Alert(#[from] triage_alerts::AlertError),
}

impl MonitorError {
    /// Creates a `Config` error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}
