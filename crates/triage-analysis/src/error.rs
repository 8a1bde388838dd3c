//! Error types for content analysis.

use thiserror::Error;

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while building an analyzer or running its self-test.
///
/// Analysis itself never fails; these only surface from configuration.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A rule table is malformed.
    #[error("invalid analyzer rules: {reason}")]
    InvalidRules {
        /// Why the rules were rejected.
        reason: String,
    },

    /// A keyword group could not be compiled into a matcher.
    #[error("failed to compile keyword group '{group}': {source}")]
    Pattern {
        /// The keyword group.
        group: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A self-test corpus is unusable.
    #[error("invalid self-test corpus: {reason}")]
    InvalidCorpus {
        /// Why the corpus was rejected.
        reason: String,
    },
}

impl AnalysisError {
    /// Creates an `InvalidRules` error.
    #[must_use]
    pub fn invalid_rules(reason: impl Into<String>) -> Self {
        Self::InvalidRules {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidCorpus` error.
    #[must_use]
    pub fn invalid_corpus(reason: impl Into<String>) -> Self {
        Self::InvalidCorpus {
            reason: reason.into(),
        }
    }
}
