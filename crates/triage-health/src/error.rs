//! Error types for health checking.

use thiserror::Error;

/// Result type alias for health operations.
pub type Result<T> = std::result::Result<T, HealthError>;

/// Errors raised by probes or configuration.
///
/// Probe errors never escape a health cycle; the aggregator records them as
/// `unhealthy` entries.
#[derive(Debug, Error)]
pub enum HealthError {
    /// A probe could not complete its check.
    #[error("probe '{probe}' failed: {reason}")]
    ProbeFailed {
        /// Probe name.
        probe: String,
        /// What went wrong.
        reason: String,
    },

    /// A probe exceeded its time budget.
    #[error("probe '{probe}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Probe name.
        probe: String,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// A probe task panicked.
    #[error("probe '{probe}' panicked")]
    Panicked {
        /// Probe name.
        probe: String,
    },

    /// Configuration is invalid.
    #[error("invalid health configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration is invalid.
        reason: String,
    },
}

impl HealthError {
    /// Creates a `ProbeFailed` error.
    #[must_use]
    pub fn probe_failed(probe: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            probe: probe.into(),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            HealthError::Timeout {
                probe: "api".to_string(),
                timeout_ms: 5000
            }
            .to_string(),
            "probe 'api' timed out after 5000ms"
        );
        assert_eq!(
            HealthError::probe_failed("resources", "no data").to_string(),
            "probe 'resources' failed: no data"
        );
    }
}
