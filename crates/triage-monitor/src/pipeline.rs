//! Issue intake: analyze, label, and record what happened.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use triage_analysis::{AnalysisResult, Analyzer};
use triage_client::{ApiOperation, ApiResponse, ClientError, RateLimitedClient};
use triage_metrics::{
    ApiUsageEvent, AutoLabelingEvent, EngagementEvent, EngagementKind, ErrorEvent, EventData,
    MetricsCollector, PerformanceEvent,
};

use crate::error::Result;

/// What happened to an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueEventKind {
    /// The issue was created.
    Opened,
    /// Title or body changed.
    Edited,
    /// Someone commented.
    Commented,
    /// A person changed the labels.
    Labeled,
    /// The issue was closed.
    Closed,
}

impl IssueEventKind {
    /// Returns the engagement this event counts as, if any.
    #[must_use]
    pub const fn engagement(&self) -> Option<EngagementKind> {
        match self {
            Self::Opened => Some(EngagementKind::IssueOpened),
            Self::Closed => Some(EngagementKind::IssueClosed),
            Self::Commented => Some(EngagementKind::Comment),
            Self::Labeled => Some(EngagementKind::LabelChanged),
            Self::Edited => None,
        }
    }

    /// Returns true if the issue content should be (re)analyzed.
    #[must_use]
    pub const fn needs_analysis(&self) -> bool {
        matches!(self, Self::Opened | Self::Edited)
    }
}

/// An incoming issue notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// Issue number.
    pub number: u64,
    /// Issue title.
    #[serde(default)]
    pub title: String,
    /// Issue body, when present.
    #[serde(default)]
    pub body: Option<String>,
    /// What happened.
    pub kind: IssueEventKind,
}

impl IssueEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(number: u64, kind: IssueEventKind, title: impl Into<String>, body: Option<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body,
            kind,
        }
    }
}

/// Result of processing one event.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    /// Issue number.
    pub number: u64,
    /// Analyzer output, if the event was analyzed.
    pub analysis: Option<AnalysisResult>,
    /// Labels the provider reports as applied.
    pub applied_labels: Vec<String>,
}

/// Turns issue events into labels and metrics.
#[derive(Debug, Clone)]
pub struct TriagePipeline {
    analyzer: Arc<Analyzer>,
    client: RateLimitedClient,
    metrics: MetricsCollector,
    token: CancellationToken,
}

impl TriagePipeline {
    /// Creates a pipeline. Quota waits are abandoned when `token` is cancelled.
    #[must_use]
    pub const fn new(
        analyzer: Arc<Analyzer>,
        client: RateLimitedClient,
        metrics: MetricsCollector,
        token: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            client,
            metrics,
            token,
        }
    }

    /// Processes one event.
    ///
    /// Opened and edited issues are analyzed and the resulting labels applied
    /// through the rate-limited client. Every event that counts as engagement
    /// is recorded.
    ///
    /// # Errors
    ///
    /// Returns the provider error if labels could not be applied (after it has
    /// been recorded as an error event), or a metrics error if an event is
    /// rejected.
    pub async fn process_issue(&self, event: &IssueEvent) -> Result<TriageOutcome> {
        let started = Instant::now();

        if let Some(kind) = event.kind.engagement() {
            self.metrics.record_now(EventData::Engagement(EngagementEvent {
                kind,
                issue_number: Some(event.number),
            }))?;
        }

        if !event.kind.needs_analysis() {
            debug!(issue = event.number, kind = ?event.kind, "event recorded without analysis");
            return Ok(TriageOutcome {
                number: event.number,
                analysis: None,
                applied_labels: Vec::new(),
            });
        }

        let analysis_started = Instant::now();
        let analysis = self
            .analyzer
            .analyze_optional(Some(event.title.as_str()), event.body.as_deref());
        let labels: Vec<String> = analysis.labels().iter().cloned().collect();

        self.metrics.record_now(EventData::AutoLabeling(AutoLabelingEvent {
            issue_number: event.number,
            labels: labels.clone(),
            confidence: analysis.confidence(),
            correct: None,
            processing_ms: elapsed_ms(analysis_started),
        }))?;

        let applied_labels = if labels.is_empty() {
            debug!(issue = event.number, "no labels suggested");
            Vec::new()
        } else {
            self.apply_labels(event.number, labels).await?
        };

        self.metrics.record_now(EventData::Performance(PerformanceEvent {
            operation: "triage".to_string(),
            duration_ms: elapsed_ms(started),
            memory_bytes: None,
        }))?;

        Ok(TriageOutcome {
            number: event.number,
            analysis: Some(analysis),
            applied_labels,
        })
    }

    async fn apply_labels(&self, number: u64, labels: Vec<String>) -> Result<Vec<String>> {
        let operation = ApiOperation::AddLabels { number, labels };
        let timed = self.client.call_timed(&operation, &self.token).await;
        let response_time_ms = timed.provider_time.as_secs_f64() * 1000.0;

        match timed.result {
            Ok(response) => {
                self.record_api_usage(&operation, 200, response_time_ms)?;
                let applied = match response {
                    ApiResponse::Labels { labels } => labels,
                    _ => match operation {
                        ApiOperation::AddLabels { labels, .. } => labels,
                        _ => Vec::new(),
                    },
                };
                info!(issue = number, labels = ?applied, "labels applied");
                Ok(applied)
            }
            Err(e @ ClientError::Cancelled { .. }) => {
                debug!(issue = number, "labeling abandoned on shutdown");
                Err(e.into())
            }
            Err(e) => {
                if let Some(status) = e.status_code() {
                    self.record_api_usage(&operation, status, response_time_ms)?;
                }
                self.metrics.record_now(EventData::Error(ErrorEvent {
                    component: "api".to_string(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }))?;
                warn!(issue = number, kind = e.kind(), error = %e, "failed to apply labels");
                Err(e.into())
            }
        }
    }

    fn record_api_usage(&self, operation: &ApiOperation, status_code: u16, response_time_ms: f64) -> Result<()> {
        self.metrics.record_now(EventData::ApiUsage(ApiUsageEvent {
            endpoint: operation.name().to_string(),
            status_code,
            response_time_ms,
            rate_limit_remaining: self.client.last_state().map(|s| s.remaining()),
        }))?;
        Ok(())
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
