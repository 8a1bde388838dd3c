//! Notification channels for alert delivery.
//!
//! Every channel implements [`NotificationChannel::send`] for a single
//! alert. The engine dispatches to all enabled channels concurrently and
//! treats them uniformly; a failing channel never blocks the others.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{AlertError, Result};
use crate::types::{Alert, AlertLevel};

/// Boxed future returned by channel and transport sends.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A destination for alerts.
pub trait NotificationChannel: Send + Sync + fmt::Debug {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    /// Returns true if this channel should receive alerts.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Delivers one alert.
    ///
    /// Errors must not include endpoint URLs or credentials.
    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a>;
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
    enabled: bool,
}

impl LogChannel {
    /// Creates a new log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            match alert.level {
                AlertLevel::Critical => error!(
                    alert_id = %alert.id,
                    component = %alert.component,
                    metric = %alert.metric,
                    value = alert.value,
                    threshold = alert.threshold,
                    "ALERT {}",
                    alert.message
                ),
                AlertLevel::Warning => warn!(
                    alert_id = %alert.id,
                    component = %alert.component,
                    metric = %alert.metric,
                    "ALERT {}",
                    alert.message
                ),
                AlertLevel::Info => info!(
                    alert_id = %alert.id,
                    component = %alert.component,
                    metric = %alert.metric,
                    "ALERT {}",
                    alert.message
                ),
            }
            Ok(())
        })
    }
}

/// Configuration for a generic HTTP webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Channel name.
    pub name: String,
    /// Endpoint URL. Treated as secret: never logged.
    pub url: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether the channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_enabled() -> bool {
    true
}

impl WebhookConfig {
    /// Creates a webhook configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the URL is not http(s).
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let config = Self {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            enabled: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` for an empty name, a non-http(s)
    /// URL or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.name, &self.url)?;
        if self.timeout_secs == 0 {
            return Err(AlertError::invalid_config(format!(
                "channel '{}': timeout_secs must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

fn validate_endpoint(name: &str, url: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AlertError::invalid_config("channel name cannot be empty"));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| AlertError::invalid_config(format!("channel '{name}': invalid URL")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AlertError::invalid_config(format!(
            "channel '{name}': URL must be http or https"
        )));
    }
    Ok(())
}

/// JSON body posted by [`WebhookChannel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Payload format version.
    pub version: String,
    /// `firing` or `resolved`.
    pub status: String,
    /// The alert.
    pub alert: Alert,
}

impl WebhookPayload {
    /// Builds the payload for an alert.
    #[must_use]
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            version: "1".to_string(),
            status: if alert.resolved { "resolved" } else { "firing" }.to_string(),
            alert: alert.clone(),
        }
    }
}

/// Posts alerts as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    config: WebhookConfig,
    http: reqwest::Client,
}

impl WebhookChannel {
    /// Creates a webhook channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the configuration is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http(&config.name, config.timeout_secs)?;
        Ok(Self { config, http })
    }

    /// Formats the payload for an alert.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Serialization` if serialization fails.
    pub fn format_payload(&self, alert: &Alert) -> Result<String> {
        serde_json::to_string(&WebhookPayload::from_alert(alert)).map_err(AlertError::from)
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let body = self.format_payload(alert)?;
            let mut request = self
                .http
                .post(&self.config.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }
            post(self.name(), request).await
        })
    }
}

/// Configuration for a chat (Slack-compatible) incoming webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Channel name.
    pub name: String,
    /// Incoming webhook URL. Treated as secret: never logged.
    pub webhook_url: String,
    /// Override of the destination chat channel.
    #[serde(default)]
    pub channel: Option<String>,
    /// Override of the posting username.
    #[serde(default)]
    pub username: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether the channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SlackConfig {
    /// Creates a chat webhook configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the URL is not http(s).
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>) -> Result<Self> {
        let config = Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            channel: None,
            username: None,
            timeout_secs: default_timeout_secs(),
            enabled: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` for an empty name or bad URL.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.name, &self.webhook_url)
    }
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

/// Posts alerts as chat messages.
#[derive(Debug, Clone)]
pub struct SlackChannel {
    config: SlackConfig,
    http: reqwest::Client,
}

impl SlackChannel {
    /// Creates a chat channel.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: SlackConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http(&config.name, config.timeout_secs)?;
        Ok(Self { config, http })
    }

    /// Formats the message text for an alert.
    #[must_use]
    pub fn format_text(alert: &Alert) -> String {
        let icon = match alert.level {
            AlertLevel::Critical => ":rotating_light:",
            AlertLevel::Warning => ":warning:",
            AlertLevel::Info => ":information_source:",
        };
        format!(
            "{icon} *[{}] {}/{}* {}",
            alert.level.as_str().to_uppercase(),
            alert.component,
            alert.metric,
            alert.message
        )
    }
}

impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let payload = SlackPayload {
                text: Self::format_text(alert),
                channel: self.config.channel.as_deref(),
                username: self.config.username.as_deref(),
            };
            let request = self.http.post(&self.config.webhook_url).json(&payload);
            post(self.name(), request).await
        })
    }
}

fn build_http(name: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AlertError::invalid_config(format!("channel '{name}': {}", e.without_url())))
}

async fn post(channel: &str, request: reqwest::RequestBuilder) -> Result<()> {
    let response = request
        .send()
        .await
        .map_err(|e| AlertError::notification(channel, e.without_url().to_string()))?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(AlertError::notification(channel, format!("endpoint returned status {}", status.as_u16())))
    }
}

/// An email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Hands formatted emails to a mail system.
pub trait MailTransport: Send + Sync + fmt::Debug {
    /// Delivers one message.
    fn deliver<'a>(&'a self, message: &'a EmailMessage) -> SendFuture<'a>;
}

/// Placeholder transport for channels built before a mail system is
/// attached. Every delivery fails so undelivered alerts are counted as such.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredMailTransport;

impl MailTransport for UnconfiguredMailTransport {
    fn deliver<'a>(&'a self, message: &'a EmailMessage) -> SendFuture<'a> {
        Box::pin(async move {
            warn!(
                to = ?message.to,
                subject = %message.subject,
                "email not sent, no mail transport configured"
            );
            Err(AlertError::notification("email", "no mail transport configured"))
        })
    }
}

/// Configuration for the email channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Channel name.
    pub name: String,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Prefix for subject lines.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Whether the channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_subject_prefix() -> String {
    "[triage]".to_string()
}

impl EmailConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` for an empty name, no recipients,
    /// or an address without `@`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlertError::invalid_config("channel name cannot be empty"));
        }
        if self.to.is_empty() {
            return Err(AlertError::invalid_config(format!(
                "channel '{}': at least one recipient is required",
                self.name
            )));
        }
        if let Some(bad) = std::iter::once(&self.from)
            .chain(&self.to)
            .find(|addr| !addr.contains('@'))
        {
            return Err(AlertError::invalid_config(format!(
                "channel '{}': invalid address '{bad}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Formats alerts as email and hands them to a [`MailTransport`].
#[derive(Debug, Clone)]
pub struct EmailChannel {
    config: EmailConfig,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    /// Creates an email channel with no transport attached. Sends fail until
    /// one is supplied through [`with_transport`](Self::with_transport).
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: EmailConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport: Arc::new(UnconfiguredMailTransport),
        })
    }

    /// Replaces the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Returns the recipient addresses.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.config.to
    }

    /// Builds the message for an alert.
    #[must_use]
    pub fn format_message(&self, alert: &Alert) -> EmailMessage {
        let subject = format!(
            "{} {} alert: {} {}",
            self.config.subject_prefix,
            alert.level.as_str().to_uppercase(),
            alert.component,
            alert.metric
        );
        let body = format!(
            "{}\n\nComponent: {}\nMetric: {}\nObserved value: {}\nThreshold: {}\nLevel: {}\nRaised at: {}\nAlert id: {}\n",
            alert.message,
            alert.component,
            alert.metric,
            alert.value,
            alert.threshold,
            alert.level,
            alert.created_at.to_rfc3339(),
            alert.id
        );
        EmailMessage {
            from: self.config.from.clone(),
            to: self.config.to.clone(),
            subject,
            body,
        }
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let message = self.format_message(alert);
            self.transport
                .deliver(&message)
                .await
                .map_err(|e| match e {
                    AlertError::NotificationFailed { reason, .. } => {
                        AlertError::notification(self.name(), reason)
                    }
                    other => other,
                })
        })
    }
}
