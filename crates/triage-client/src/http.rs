//! REST transport for GitHub-compatible issue trackers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{ApiFuture, TicketingApi};
use crate::error::{ClientError, Result};
use crate::types::{
    ApiOperation, ApiResponse, Comment, Credential, Issue, LabelSpec, LabelSyncReport, Milestone,
    RateLimitState,
};

/// Longest provider message kept in an error.
const MAX_ERROR_MESSAGE: usize = 200;

/// Connection settings for the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root, e.g. `https://api.github.com`.
    pub base_url: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            timeout_secs: 30,
            user_agent: concat!("triage-monitor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ProviderConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the URL does not parse or the
    /// repository is not named.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| ClientError::config(format!("invalid base_url: {e}")))?;
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(ClientError::config("owner and repo must be set"));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::config("timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Hints the provider attaches to failed responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorHints {
    /// `retry-after` header, in seconds.
    pub retry_after_secs: Option<u64>,
    /// `x-ratelimit-remaining` header.
    pub ratelimit_remaining: Option<u32>,
    /// `x-ratelimit-reset` header, as a Unix timestamp in seconds.
    pub ratelimit_reset: Option<i64>,
}

impl ErrorHints {
    fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }

        Self {
            retry_after_secs: parse(headers, "retry-after"),
            ratelimit_remaining: parse(headers, "x-ratelimit-remaining"),
            ratelimit_reset: parse(headers, "x-ratelimit-reset"),
        }
    }
}

/// Maps a non-success status to the error taxonomy.
#[must_use]
pub fn classify_status(
    operation: &'static str,
    status: u16,
    hints: ErrorHints,
    body: &str,
) -> ClientError {
    let message = provider_message(body);

    match status {
        401 => ClientError::Authentication { operation },
        403 | 429 => {
            if let Some(secs) = hints.retry_after_secs {
                ClientError::AbuseDetected {
                    operation,
                    retry_after: Duration::from_secs(secs),
                }
            } else if status == 429 || hints.ratelimit_remaining == Some(0) {
                ClientError::QuotaExceeded {
                    operation,
                    status,
                    reset_at: hints
                        .ratelimit_reset
                        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                }
            } else {
                ClientError::Permission { operation, message }
            }
        }
        422 => ClientError::Validation {
            operation,
            reason: message,
        },
        _ => ClientError::Provider {
            operation,
            status,
            message,
        },
    }
}

/// Extracts `message` from a JSON error body, falling back to the raw text.
fn provider_message(body: &str) -> String {
    let text = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if text.chars().count() > MAX_ERROR_MESSAGE {
        let truncated: String = text.chars().take(MAX_ERROR_MESSAGE).collect();
        format!("{truncated}...")
    } else {
        text
    }
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<WireLabel>,
}

impl From<WireIssue> for Issue {
    fn from(wire: WireIssue) -> Self {
        Self {
            number: wire.number,
            title: wire.title,
            body: wire.body,
            state: wire.state,
            labels: wire.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRate {
    limit: u32,
    remaining: u32,
    reset: i64,
}

#[derive(Debug, Deserialize)]
struct WireRateLimit {
    rate: WireRate,
}

/// HTTP provider client.
#[derive(Debug, Clone)]
pub struct HttpTicketingApi {
    http: reqwest::Client,
    config: ProviderConfig,
    credential: Credential,
}

impl HttpTicketingApi {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: ProviderConfig, credential: Credential) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {}", e.without_url())))?;

        Ok(Self {
            http,
            config,
            credential,
        })
    }

    /// Returns the provider configuration.
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, operation: &'static str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ClientError::config(format!("invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::validation(operation, "base_url cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_url(&self, operation: &'static str, segments: &[&str]) -> Result<Url> {
        let mut all = vec!["repos", self.config.owner.as_str(), self.config.repo.as_str()];
        all.extend_from_slice(segments);
        self.url(operation, &all)
    }

    /// Sends a request and returns the status and body, mapping transport
    /// failures. Non-success statuses are returned for the caller to classify.
    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<(StatusCode, HeaderMap, String)> {
        debug!(operation, method = %method, path = url.path(), "provider request");

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.credential.expose()))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, &self.config.user_agent);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| network_error(operation, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| network_error(operation, e))?;
        Ok((status, headers, text))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T> {
        let (status, headers, text) = self.send(operation, method, url, body).await?;
        if !status.is_success() {
            return Err(classify_status(
                operation,
                status.as_u16(),
                ErrorHints::from_headers(&headers),
                &text,
            ));
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Provider {
            operation,
            status: status.as_u16(),
            message: format!("unexpected response body: {e}"),
        })
    }

    async fn sync_labels(&self, operation: &'static str, labels: &[LabelSpec]) -> Result<ApiResponse> {
        let mut report = LabelSyncReport::default();

        for spec in labels {
            let url = self.repo_url(operation, &["labels", &spec.name])?;
            let (status, headers, text) = self.send(operation, Method::GET, url, None).await?;

            if status.is_success() {
                report.existing.push(spec.name.clone());
                continue;
            }
            if status != StatusCode::NOT_FOUND {
                return Err(classify_status(
                    operation,
                    status.as_u16(),
                    ErrorHints::from_headers(&headers),
                    &text,
                ));
            }

            let url = self.repo_url(operation, &["labels"])?;
            let body = serde_json::to_value(spec)
                .map_err(|e| ClientError::validation(operation, e.to_string()))?;
            let _: WireLabel = self.request(operation, Method::POST, url, Some(body)).await?;
            report.created.push(spec.name.clone());
        }

        Ok(ApiResponse::LabelSync(report))
    }
}

fn network_error(operation: &'static str, error: reqwest::Error) -> ClientError {
    ClientError::TransientNetwork {
        operation,
        message: error.without_url().to_string(),
    }
}

impl TicketingApi for HttpTicketingApi {
    fn rate_limit(&self) -> ApiFuture<'_, RateLimitState> {
        Box::pin(async move {
            let operation = "rate_limit";
            let url = self.url(operation, &["rate_limit"])?;
            let wire: WireRateLimit = self.request(operation, Method::GET, url, None).await?;
            let reset_at = DateTime::<Utc>::from_timestamp(wire.rate.reset, 0)
                .ok_or_else(|| ClientError::validation(operation, "reset timestamp out of range"))?;
            RateLimitState::new(wire.rate.limit, wire.rate.remaining, reset_at)
        })
    }

    fn execute<'a>(&'a self, operation: &'a ApiOperation) -> ApiFuture<'a, ApiResponse> {
        Box::pin(async move {
            operation.validate()?;
            let op = operation.name();

            match operation {
                ApiOperation::CreateIssue { title, body, labels } => {
                    let url = self.repo_url(op, &["issues"])?;
                    let payload = json!({ "title": title, "body": body, "labels": labels });
                    let issue: WireIssue = self.request(op, Method::POST, url, Some(payload)).await?;
                    Ok(ApiResponse::Issue(issue.into()))
                }
                ApiOperation::GetIssue { number } => {
                    let url = self.repo_url(op, &["issues", &number.to_string()])?;
                    let issue: WireIssue = self.request(op, Method::GET, url, None).await?;
                    Ok(ApiResponse::Issue(issue.into()))
                }
                ApiOperation::AddLabels { number, labels } => {
                    let url = self.repo_url(op, &["issues", &number.to_string(), "labels"])?;
                    let payload = json!({ "labels": labels });
                    let applied: Vec<WireLabel> =
                        self.request(op, Method::POST, url, Some(payload)).await?;
                    Ok(ApiResponse::Labels {
                        labels: applied.into_iter().map(|l| l.name).collect(),
                    })
                }
                ApiOperation::RemoveLabel { number, label } => {
                    let url =
                        self.repo_url(op, &["issues", &number.to_string(), "labels", label])?;
                    let remaining: Vec<WireLabel> =
                        self.request(op, Method::DELETE, url, None).await?;
                    Ok(ApiResponse::Labels {
                        labels: remaining.into_iter().map(|l| l.name).collect(),
                    })
                }
                ApiOperation::CreateComment { number, body } => {
                    let url = self.repo_url(op, &["issues", &number.to_string(), "comments"])?;
                    let comment: Comment =
                        self.request(op, Method::POST, url, Some(json!({ "body": body }))).await?;
                    Ok(ApiResponse::Comment(comment))
                }
                ApiOperation::SyncLabels { labels } => self.sync_labels(op, labels).await,
                ApiOperation::ListMilestones => {
                    let mut url = self.repo_url(op, &["milestones"])?;
                    url.query_pairs_mut().append_pair("state", "open");
                    let milestones: Vec<Milestone> = self.request(op, Method::GET, url, None).await?;
                    Ok(ApiResponse::Milestones { milestones })
                }
                ApiOperation::AssignMilestone { number, milestone } => {
                    let url = self.repo_url(op, &["issues", &number.to_string()])?;
                    let payload = json!({ "milestone": milestone });
                    let issue: WireIssue = self.request(op, Method::PATCH, url, Some(payload)).await?;
                    Ok(ApiResponse::Issue(issue.into()))
                }
            }
        })
    }
}
