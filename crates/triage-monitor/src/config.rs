//! Service configuration.
//!
//! One JSON document with a section per component. Every section has
//! defaults, so `{}` is a valid (dry-run) configuration. The provider
//! credential is never part of the file; it comes from `TRIAGE_TOKEN` or
//! `GITHUB_TOKEN`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use triage_alerts::{
    AlertEngineConfig, EmailChannel, EmailConfig, LogChannel, NotificationChannel, SlackChannel,
    SlackConfig, WebhookChannel, WebhookConfig,
};
use triage_analysis::AnalyzerRules;
use triage_client::{
    ClientConfig, Credential, HttpTicketingApi, MockTicketingApi, ProviderConfig, TicketingApi,
    TOKEN_ENV_VARS,
};
use triage_health::HealthConfig;
use triage_metrics::MetricsConfig;

use crate::error::{MonitorError, Result};

/// A notification channel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Tracing log output.
    Log {
        /// Channel name.
        #[serde(default = "default_log_name")]
        name: String,
    },
    /// Generic JSON webhook.
    Webhook(WebhookConfig),
    /// Chat incoming webhook.
    Slack(SlackConfig),
    /// Email.
    Email(EmailConfig),
}

fn default_log_name() -> String {
    "log".to_string()
}

impl ChannelConfig {
    /// Builds the channel.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Alert` if the channel definition is invalid.
    pub fn build(&self) -> Result<Arc<dyn NotificationChannel>> {
        let channel: Arc<dyn NotificationChannel> = match self {
            Self::Log { name } => Arc::new(LogChannel::new(name)),
            Self::Webhook(config) => Arc::new(WebhookChannel::new(config.clone())?),
            Self::Slack(config) => Arc::new(SlackChannel::new(config.clone())?),
            Self::Email(config) => {
                warn!(channel = %config.name, "email channel has no mail transport attached");
                Arc::new(EmailChannel::new(config.clone())?)
            }
        };
        Ok(channel)
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Use an in-memory provider instead of the real API.
    pub dry_run: bool,
    /// Provider connection.
    pub provider: ProviderConfig,
    /// Quota handling.
    pub client: ClientConfig,
    /// Analyzer rule tables.
    pub analysis: AnalyzerRules,
    /// Metrics retention and compaction.
    pub metrics: MetricsConfig,
    /// Health cycle and probe thresholds.
    pub health: HealthConfig,
    /// Alert thresholds, cooldown and ceiling.
    pub alerts: AlertEngineConfig,
    /// Notification channels. Empty means a single log channel.
    pub channels: Vec<ChannelConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            provider: ProviderConfig::default(),
            client: ClientConfig::default(),
            analysis: AnalyzerRules::default(),
            metrics: MetricsConfig::default(),
            health: HealthConfig::default(),
            alerts: AlertEngineConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if the JSON is invalid or a section
    /// fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| MonitorError::config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` naming the failing section.
    pub fn validate(&self) -> Result<()> {
        let section = |name: &str, e: &dyn std::fmt::Display| MonitorError::config(format!("{name}: {e}"));

        if !self.dry_run {
            self.provider.validate().map_err(|e| section("provider", &e))?;
        }
        self.client.validate().map_err(|e| section("client", &e))?;
        self.analysis.validate().map_err(|e| section("analysis", &e))?;
        self.metrics.validate().map_err(|e| section("metrics", &e))?;
        self.health.validate().map_err(|e| section("health", &e))?;
        self.alerts.validate().map_err(|e| section("alerts", &e))?;
        for channel in &self.channels {
            let result = match channel {
                ChannelConfig::Log { name } if name.trim().is_empty() => {
                    Err(MonitorError::config("channel name cannot be empty"))
                }
                ChannelConfig::Log { .. } => Ok(()),
                ChannelConfig::Webhook(c) => c.validate().map_err(MonitorError::from),
                ChannelConfig::Slack(c) => c.validate().map_err(MonitorError::from),
                ChannelConfig::Email(c) => c.validate().map_err(MonitorError::from),
            };
            result.map_err(|e| section("channels", &e))?;
        }
        Ok(())
    }

    /// Builds the provider implementation.
    ///
    /// Dry runs get an in-memory provider; otherwise the credential is read
    /// from the environment.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if no credential is set, or a client
    /// error if the HTTP client cannot be built.
    pub fn build_api(&self) -> Result<Arc<dyn TicketingApi>> {
        if self.dry_run {
            return Ok(Arc::new(MockTicketingApi::new()));
        }
        let credential = Credential::from_env().ok_or_else(|| {
            MonitorError::config(format!(
                "no provider credential: set {} or {}",
                TOKEN_ENV_VARS[0], TOKEN_ENV_VARS[1]
            ))
        })?;
        Ok(Arc::new(HttpTicketingApi::new(self.provider.clone(), credential)?))
    }

    /// Builds the configured channels, or a log channel when none are set.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel definition is invalid.
    pub fn build_channels(&self) -> Result<Vec<Arc<dyn NotificationChannel>>> {
        if self.channels.is_empty() {
            return Ok(vec![Arc::new(LogChannel::default())]);
        }
        self.channels.iter().map(ChannelConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use triage_alerts::{Alert, AlertLevel, ComparisonOperator, Observation, ThresholdRule};

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_document_is_a_valid_dry_run() {
        let config = MonitorConfig::from_json("{}").unwrap();
        assert!(config.dry_run);
        assert_eq!(config.health.interval_secs, 60);
        assert_eq!(config.alerts.max_alerts_per_hour, 10_000);
        assert_eq!(config.build_channels().unwrap().len(), 1);
    }

    #[test]
    fn save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = MonitorConfig::default();
        config.alerts.cooldown_secs = 60;
        config.save(file.path()).unwrap();

        let loaded = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let file = create_temp_config(
            r#"{
                "client": { "buffer_fraction": 0.3 },
                "health": { "probe_timeout_ms": 2000 }
            }"#,
        );
        let config = MonitorConfig::load(file.path()).unwrap();
        assert!((config.client.buffer_fraction - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.client.low_water_mark, 10);
        assert_eq!(config.health.probe_timeout_ms, 2000);
        assert_eq!(config.health.history_size, 100);
    }

    #[test]
    fn invalid_section_is_named() {
        let err = MonitorConfig::from_json(r#"{ "health": { "interval_secs": 0 } }"#).unwrap_err();
        assert!(err.to_string().starts_with("configuration error: health:"));
    }

    #[test]
    fn live_mode_requires_repository() {
        let err = MonitorConfig::from_json(r#"{ "dry_run": false }"#).unwrap_err();
        assert!(err.to_string().contains("provider"));
    }

    #[test]
    fn channels_parse_by_type() {
        let config = MonitorConfig::from_json(
            r#"{
                "channels": [
                    { "type": "log" },
                    { "type": "webhook", "name": "ops", "url": "https://hooks.example.com/ops" },
                    { "type": "email", "name": "mail", "from": "bot@example.com", "to": ["ops@example.com"] }
                ]
            }"#,
        )
        .unwrap();
        let channels = config.build_channels().unwrap();
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["log", "ops", "mail"]);
    }

    #[tokio::test]
    async fn email_channel_without_transport_fails_to_send() {
        let config = MonitorConfig::from_json(
            r#"{ "channels": [ { "type": "email", "name": "mail", "from": "bot@example.com", "to": ["ops@example.com"] } ] }"#,
        )
        .unwrap();
        let channels = config.build_channels().unwrap();

        let rule = ThresholdRule::new(
            "api",
            "error_rate",
            ComparisonOperator::GreaterThan,
            None,
            Some(0.25),
        )
        .unwrap();
        let alert = Alert::new(
            &Observation::new("api", "error_rate", 0.3),
            &rule,
            AlertLevel::Critical,
            0.25,
        );
        assert!(channels[0].send(&alert).await.is_err());
    }

    #[test]
    fn invalid_channel_rejected() {
        let err = MonitorConfig::from_json(
            r#"{ "channels": [ { "type": "slack", "name": "chat", "webhook_url": "nope" } ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = MonitorConfig::load("/nonexistent/triage-monitor.json").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn dry_run_uses_in_memory_provider() {
        assert!(MonitorConfig::default().build_api().is_ok());
    }
}
