//! Error types for the alerting engine.

use thiserror::Error;

/// Errors that can occur in the alerting engine.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A threshold rule is malformed.
    #[error("invalid threshold rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Engine or channel configuration is invalid.
    #[error("invalid alert configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// A channel failed to deliver an alert.
    #[error("notification via '{channel}' failed: {reason}")]
    NotificationFailed {
        /// Channel name.
        channel: String,
        /// What went wrong. Never contains endpoint URLs.
        reason: String,
    },

    /// Payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AlertError {
    /// Creates an `InvalidRule` error.
    #[must_use]
    pub fn invalid_rule(reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates a `NotificationFailed` error.
    #[must_use]
    pub fn notification(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotificationFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_rule() {
        assert_eq!(
            AlertError::invalid_rule("empty metric").to_string(),
            "invalid threshold rule: empty metric"
        );
    }

    #[test]
    fn error_display_notification_failed() {
        assert_eq!(
            AlertError::notification("slack", "status 500").to_string(),
            "notification via 'slack' failed: status 500"
        );
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let alert_err: AlertError = json_err.into();
        assert!(matches!(alert_err, AlertError::Serialization(_)));
    }
}
