//! Error types for the triage-metrics crate.

use thiserror::Error;

/// Errors that can occur in the metrics system.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// An event failed validation at construction time.
    #[error("invalid {category} event: {reason}")]
    Validation {
        /// The category of the rejected event.
        category: &'static str,
        /// The reason the event is invalid.
        reason: String,
    },

    /// The time range is invalid (start > end).
    #[error("invalid time range: start={start}, end={end}")]
    InvalidTimeRange {
        /// Start timestamp.
        start: i64,
        /// End timestamp.
        end: i64,
    },

    /// The collector configuration is invalid.
    #[error("invalid metrics configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

impl MetricsError {
    pub(crate) fn validation(category: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            category,
            reason: reason.into(),
        }
    }
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_validation() {
        let err = MetricsError::validation("api_usage", "status code 42 out of range");
        assert_eq!(
            err.to_string(),
            "invalid api_usage event: status code 42 out of range"
        );
    }

    #[test]
    fn error_display_invalid_time_range() {
        let err = MetricsError::InvalidTimeRange { start: 100, end: 50 };
        assert_eq!(err.to_string(), "invalid time range: start=100, end=50");
    }

    #[test]
    fn error_display_invalid_config() {
        let err = MetricsError::InvalidConfig {
            reason: "compaction interval is zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid metrics configuration: compaction interval is zero"
        );
    }
}
