//! Error types for provider API operations.
//!
//! Every variant names the operation that failed. None of them carry the
//! credential, request headers or anything derived from them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling the ticketing provider.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The credential was rejected (HTTP 401).
    #[error("{operation}: authentication failed")]
    Authentication {
        /// The operation that failed.
        operation: &'static str,
    },

    /// The credential lacks permission for the operation (HTTP 403).
    #[error("{operation}: permission denied: {message}")]
    Permission {
        /// The operation that failed.
        operation: &'static str,
        /// Provider-supplied reason.
        message: String,
    },

    /// The provider quota is exhausted.
    #[error("{operation}: quota exceeded (status {status})")]
    QuotaExceeded {
        /// The operation that failed.
        operation: &'static str,
        /// HTTP status returned by the provider.
        status: u16,
        /// When the quota resets, if the provider said so.
        reset_at: Option<DateTime<Utc>>,
    },

    /// The provider's abuse detection tripped; retry once after the delay.
    #[error("{operation}: abuse detection triggered, retry after {}s", .retry_after.as_secs())]
    AbuseDetected {
        /// The operation that failed.
        operation: &'static str,
        /// Suggested wait before retrying.
        retry_after: Duration,
    },

    /// Connection, timeout or body transfer failure.
    #[error("{operation}: network error: {message}")]
    TransientNetwork {
        /// The operation that failed.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Malformed input or a payload the provider refused (HTTP 422).
    #[error("{operation}: validation failed: {reason}")]
    Validation {
        /// The operation that failed.
        operation: &'static str,
        /// Why validation failed.
        reason: String,
    },

    /// The caller was cancelled while waiting for quota to reset.
    #[error("{operation}: cancelled while waiting for quota reset")]
    Cancelled {
        /// The operation that was abandoned.
        operation: &'static str,
    },

    /// Any other non-success status.
    #[error("{operation}: provider returned {status}: {message}")]
    Provider {
        /// The operation that failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Provider-supplied message, truncated.
        message: String,
    },

    /// Client configuration is invalid.
    #[error("invalid client configuration: {reason}")]
    Config {
        /// Why the configuration is invalid.
        reason: String,
    },
}

impl ClientError {
    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a `Config` error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns the operation name, if the error is tied to one.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Authentication { operation }
            | Self::Permission { operation, .. }
            | Self::QuotaExceeded { operation, .. }
            | Self::AbuseDetected { operation, .. }
            | Self::TransientNetwork { operation, .. }
            | Self::Validation { operation, .. }
            | Self::Cancelled { operation }
            | Self::Provider { operation, .. } => Some(*operation),
            Self::Config { .. } => None,
        }
    }

    /// Returns `true` if the caller may retry after backing off.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } | Self::AbuseDetected { .. } | Self::TransientNetwork { .. } => {
                true
            }
            Self::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if retrying can never succeed without operator action.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::Permission { .. } | Self::Config { .. }
        )
    }

    /// Returns the HTTP status behind the error, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Permission { .. } | Self::AbuseDetected { .. } => Some(403),
            Self::QuotaExceeded { status, .. } | Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns a stable short name for the error kind, for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Permission { .. } => "permission",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::AbuseDetected { .. } => "abuse_detected",
            Self::TransientNetwork { .. } => "network",
            Self::Validation { .. } => "validation",
            Self::Cancelled { .. } => "cancelled",
            Self::Provider { .. } => "provider",
            Self::Config { .. } => "config",
        }
    }
}
