//! Analysis result types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label applied when security keywords are present.
pub const SECURITY_LABEL: &str = "type:security";

/// Issue priority tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// No priority signal.
    #[default]
    Normal,
    /// Needs attention soon.
    High,
    /// Needs attention now.
    Critical,
}

impl Priority {
    /// Returns the priority as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns the `priority:<tier>` label, or `None` for `Normal`.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Normal => None,
            other => Some(format!("priority:{}", other.as_str())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the component was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentSource {
    /// A file path literal in the text.
    Path,
    /// A component keyword.
    Keyword,
}

/// The labels derived from one issue.
///
/// Built in one step by the analyzer and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    labels: BTreeSet<String>,
    components: Vec<String>,
    component_source: Option<ComponentSource>,
    priority: Priority,
    security_flag: bool,
    confidence: f64,
}

impl AnalysisResult {
    pub(crate) fn new(
        component: Option<(String, ComponentSource)>,
        priority: Priority,
        priority_matched: bool,
        security_flag: bool,
    ) -> Self {
        let mut labels = BTreeSet::new();
        let mut confidence = 0.0;

        let (components, component_source) = match component {
            Some((id, source)) => {
                labels.insert(format!("component:{id}"));
                confidence += 0.4;
                (vec![id], Some(source))
            }
            None => (Vec::new(), None),
        };
        if priority_matched {
            confidence += 0.3;
        }
        if let Some(label) = priority.label() {
            labels.insert(label);
        }
        if security_flag {
            labels.insert(SECURITY_LABEL.to_string());
            confidence += 0.3;
        }

        Self {
            labels,
            components,
            component_source,
            priority,
            security_flag,
            confidence: f64::min(confidence, 1.0),
        }
    }

    /// A result with no labels, normal priority and zero confidence.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(None, Priority::Normal, false, false)
    }

    /// All labels to apply.
    #[must_use]
    pub const fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Matched component ids.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// How the component was matched, if one was.
    #[must_use]
    pub const fn component_source(&self) -> Option<ComponentSource> {
        self.component_source
    }

    /// Computed priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether security keywords were present.
    #[must_use]
    pub const fn security_flag(&self) -> bool {
        self.security_flag
    }

    /// Confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Returns true if no labels were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn normal_priority_has_no_label() {
        assert_eq!(Priority::Normal.label(), None);
        assert_eq!(Priority::Low.label().as_deref(), Some("priority:low"));
    }

    #[test]
    fn empty_result() {
        let result = AnalysisResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.priority(), Priority::Normal);
        assert!(result.confidence().abs() < f64::EPSILON);
    }

    #[test]
    fn full_match_confidence_is_capped() {
        let result = AnalysisResult::new(
            Some(("api".to_string(), ComponentSource::Keyword)),
            Priority::Critical,
            true,
            true,
        );
        assert!(result.confidence() <= 1.0);
        assert!((result.confidence() - 1.0).abs() < 1e-9);
        assert_eq!(result.labels().len(), 3);
    }
}
