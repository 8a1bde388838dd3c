//! Keyword and path tables driving the analyzer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Maps a path literal to a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    /// Substring to look for, e.g. `src/api/`.
    pub pattern: String,
    /// Component id.
    pub component: String,
}

/// Keywords identifying one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentKeywords {
    /// Component id.
    pub component: String,
    /// Keywords or phrases.
    pub keywords: Vec<String>,
}

/// Rule tables for the analyzer.
///
/// Tables are ordered; the first matching entry wins. Single-word keywords
/// match on word boundaries, anything containing whitespace or punctuation
/// matches as a plain substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerRules {
    /// Path literals, checked before keywords.
    pub paths: Vec<PathRule>,
    /// Component keyword lists, in priority order.
    pub components: Vec<ComponentKeywords>,
    /// Critical-tier priority keywords.
    pub critical: Vec<String>,
    /// High-tier priority keywords.
    pub high: Vec<String>,
    /// Low-tier priority keywords.
    pub low: Vec<String>,
    /// Security keywords.
    pub security: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn path(pattern: &str, component: &str) -> PathRule {
    PathRule {
        pattern: pattern.to_string(),
        component: component.to_string(),
    }
}

fn component(id: &str, keywords: &[&str]) -> ComponentKeywords {
    ComponentKeywords {
        component: id.to_string(),
        keywords: words(keywords),
    }
}

impl Default for AnalyzerRules {
    fn default() -> Self {
        Self {
            paths: vec![
                path("src/api/", "api"),
                path("src/auth/", "auth"),
                path("src/db/", "database"),
                path("migrations/", "database"),
                path("src/ui/", "frontend"),
                path("src/components/", "frontend"),
                path(".github/workflows/", "ci"),
                path("docs/", "docs"),
                path("readme.md", "docs"),
                path("dockerfile", "infrastructure"),
            ],
            components: vec![
                component("api", &["api", "endpoint", "rest", "graphql", "request", "webhook"]),
                component(
                    "auth",
                    &["login", "logout", "authentication", "oauth", "password", "token", "session"],
                ),
                component("database", &["database", "query", "migration", "sql", "postgres"]),
                component("frontend", &["ui", "button", "css", "layout", "page", "dashboard"]),
                component("ci", &["ci", "pipeline", "workflow", "build failure"]),
                component("docs", &["documentation", "typo", "readme", "docs"]),
                component("performance", &["slow", "latency", "memory leak", "performance"]),
            ],
            critical: words(&[
                "crash",
                "data loss",
                "outage",
                "production down",
                "critical",
                "urgent",
            ]),
            high: words(&["broken", "regression", "fails", "error", "blocker", "important"]),
            low: words(&["typo", "minor", "cosmetic", "nice to have", "enhancement", "question"]),
            security: words(&[
                "security",
                "vulnerability",
                "cve",
                "xss",
                "csrf",
                "sql injection",
                "exploit",
                "leaked",
                "exposed secret",
                "privilege escalation",
            ]),
        }
    }
}

impl AnalyzerRules {
    /// Validates the tables.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidRules` for empty keywords, patterns or
    /// component ids, and for components listed twice in the keyword table.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.paths {
            if rule.pattern.trim().is_empty() || rule.component.trim().is_empty() {
                return Err(AnalysisError::invalid_rules("path rule has empty pattern or component"));
            }
        }

        let mut seen = HashSet::new();
        for group in &self.components {
            if group.component.trim().is_empty() {
                return Err(AnalysisError::invalid_rules("component id is empty"));
            }
            if !seen.insert(group.component.as_str()) {
                return Err(AnalysisError::invalid_rules(format!(
                    "component '{}' listed twice",
                    group.component
                )));
            }
            check_keywords(&group.component, &group.keywords)?;
        }

        check_keywords("critical", &self.critical)?;
        check_keywords("high", &self.high)?;
        check_keywords("low", &self.low)?;
        check_keywords("security", &self.security)
    }
}

fn check_keywords(group: &str, keywords: &[String]) -> Result<()> {
    if keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(AnalysisError::invalid_rules(format!(
            "group '{group}' contains an empty keyword"
        )));
    }
    Ok(())
}
