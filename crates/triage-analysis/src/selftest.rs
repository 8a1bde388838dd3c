//! Labeled corpus used to measure analyzer accuracy.
//!
//! Accuracy is the share of cases whose produced label set equals the
//! expected one exactly. Confidence scores play no part in it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzer::Analyzer;
use crate::error::{AnalysisError, Result};

/// One labeled issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestCase {
    /// Issue title.
    pub title: String,
    /// Issue body.
    #[serde(default)]
    pub body: String,
    /// Labels a correct analysis produces.
    pub expected: BTreeSet<String>,
}

impl SelfTestCase {
    fn new(title: &str, body: &str, expected: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            expected: expected.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// A set of labeled cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestCorpus {
    /// The cases.
    pub cases: Vec<SelfTestCase>,
}

impl SelfTestCorpus {
    /// The corpus shipped with the default rules.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            cases: vec![
                SelfTestCase::new(
                    "API endpoint returns 500",
                    "The /users endpoint fails after deploy.",
                    &["component:api", "priority:high"],
                ),
                SelfTestCase::new(
                    "Login page crashes on submit",
                    "Users cannot sign in; the app crash happens every time.",
                    &["component:auth", "priority:critical"],
                ),
                SelfTestCase::new(
                    "Typo in README",
                    "There is a small typo in the installation docs.",
                    &["component:docs", "priority:low"],
                ),
                SelfTestCase::new(
                    "XSS vulnerability in comment rendering",
                    "Script tags in comments are executed.",
                    &["priority:high", "type:security"],
                ),
                SelfTestCase::new(
                    "Crash in src/db/pool.rs",
                    "The API call hangs when the pool is exhausted.",
                    &["component:database", "priority:critical"],
                ),
                SelfTestCase::new("Pipeline slow on large repos", "", &["component:ci"]),
                SelfTestCase::new(
                    "Question about configuration",
                    "How do I set the log level?",
                    &["priority:low"],
                ),
                SelfTestCase::new(
                    "Password reset token leaked in logs",
                    "The reset token appears in plain text in server logs.",
                    &["component:auth", "priority:high", "type:security"],
                ),
                SelfTestCase::new(
                    "Dashboard layout broken on mobile",
                    "",
                    &["component:frontend", "priority:high"],
                ),
                SelfTestCase::new("", "", &[]),
            ],
        }
    }

    /// Parses a corpus from JSON.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidCorpus` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AnalysisError::invalid_corpus(e.to_string()))
    }

    /// Number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if the corpus has no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl Default for SelfTestCorpus {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A case the analyzer got wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestFailure {
    /// Position in the corpus.
    pub index: usize,
    /// Issue title.
    pub title: String,
    /// Expected labels.
    pub expected: BTreeSet<String>,
    /// Labels produced.
    pub actual: BTreeSet<String>,
}

/// Outcome of a self-test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfTestReport {
    /// Cases run.
    pub total: usize,
    /// Cases whose labels matched exactly.
    pub passed: usize,
    /// `passed / total`.
    pub accuracy: f64,
    /// Mean confidence across cases, reported for comparison only.
    pub mean_confidence: f64,
    /// Mismatched cases.
    pub failures: Vec<SelfTestFailure>,
}

/// Runs every case in the corpus through the analyzer.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidCorpus` if the corpus is empty.
pub fn run_self_test(analyzer: &Analyzer, corpus: &SelfTestCorpus) -> Result<SelfTestReport> {
    if corpus.is_empty() {
        return Err(AnalysisError::invalid_corpus("corpus has no cases"));
    }

    let mut failures = Vec::new();
    let mut confidence_sum = 0.0;

    for (index, case) in corpus.cases.iter().enumerate() {
        let result = analyzer.analyze(&case.title, &case.body);
        confidence_sum += result.confidence();
        if result.labels() != &case.expected {
            failures.push(SelfTestFailure {
                index,
                title: case.title.clone(),
                expected: case.expected.clone(),
                actual: result.labels().clone(),
            });
        }
    }

    let total = corpus.len();
    let passed = total - failures.len();
    let report = SelfTestReport {
        total,
        passed,
        accuracy: passed as f64 / total as f64,
        mean_confidence: confidence_sum / total as f64,
        failures,
    };
    debug!(
        total,
        passed,
        accuracy = report.accuracy,
        "analyzer self-test complete"
    );
    Ok(report)
}
