//! The content analyzer.
//!
//! Matching runs in a fixed order: path literals, component keywords,
//! priority tiers, security keywords. Text is only ever searched; nothing in
//! it is interpreted.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, trace};

use crate::error::{AnalysisError, Result};
use crate::rules::AnalyzerRules;
use crate::types::{AnalysisResult, ComponentSource, Priority};

/// Bytes of combined title and body that are scanned.
pub const MAX_SCAN_BYTES: usize = 1024 * 1024;

static DEFAULT_ANALYZER: Lazy<Analyzer> = Lazy::new(|| {
    Analyzer::new(AnalyzerRules::default()).unwrap_or_else(|e| {
        error!(error = %e, "default analyzer rules failed to compile, matching disabled");
        Analyzer::inert()
    })
});

/// A compiled keyword group.
#[derive(Debug, Clone)]
struct KeywordMatcher {
    words: Option<Regex>,
    phrases: Vec<String>,
}

impl KeywordMatcher {
    const fn empty() -> Self {
        Self {
            words: None,
            phrases: Vec::new(),
        }
    }

    fn compile(group: &str, keywords: &[String]) -> Result<Self> {
        let mut words = Vec::new();
        let mut phrases = Vec::new();

        for keyword in keywords {
            let keyword = keyword.trim().to_lowercase();
            if keyword.chars().all(|c| c.is_alphanumeric() || c == '_') {
                words.push(regex::escape(&keyword));
            } else {
                phrases.push(keyword);
            }
        }

        let words = if words.is_empty() {
            None
        } else {
            let pattern = format!(r"\b(?:{})\b", words.join("|"));
            Some(Regex::new(&pattern).map_err(|source| AnalysisError::Pattern {
                group: group.to_string(),
                source,
            })?)
        };

        Ok(Self { words, phrases })
    }

    fn is_match(&self, text: &str) -> bool {
        self.words.as_ref().is_some_and(|re| re.is_match(text))
            || self.phrases.iter().any(|p| text.contains(p.as_str()))
    }
}

/// Labels issues from their title and body.
#[derive(Debug, Clone)]
pub struct Analyzer {
    paths: Vec<(String, String)>,
    components: Vec<(String, KeywordMatcher)>,
    tiers: [(Priority, KeywordMatcher); 3],
    security: KeywordMatcher,
}

impl Analyzer {
    /// Compiles an analyzer from rule tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are invalid or a keyword group fails to compile.
    pub fn new(rules: AnalyzerRules) -> Result<Self> {
        rules.validate()?;

        let paths = rules
            .paths
            .iter()
            .map(|r| (r.pattern.to_lowercase(), r.component.clone()))
            .collect();
        let components = rules
            .components
            .iter()
            .map(|g| Ok((g.component.clone(), KeywordMatcher::compile(&g.component, &g.keywords)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            paths,
            components,
            tiers: [
                (Priority::Critical, KeywordMatcher::compile("critical", &rules.critical)?),
                (Priority::High, KeywordMatcher::compile("high", &rules.high)?),
                (Priority::Low, KeywordMatcher::compile("low", &rules.low)?),
            ],
            security: KeywordMatcher::compile("security", &rules.security)?,
        })
    }

    /// An analyzer that matches nothing.
    fn inert() -> Self {
        Self {
            paths: Vec::new(),
            components: Vec::new(),
            tiers: [
                (Priority::Critical, KeywordMatcher::empty()),
                (Priority::High, KeywordMatcher::empty()),
                (Priority::Low, KeywordMatcher::empty()),
            ],
            security: KeywordMatcher::empty(),
        }
    }

    /// Returns a shared analyzer built from the default rules.
    #[must_use]
    pub fn shared() -> &'static Self {
        &DEFAULT_ANALYZER
    }

    /// Analyzes an issue.
    #[must_use]
    pub fn analyze(&self, title: &str, body: &str) -> AnalysisResult {
        let text = scan_text(title, body);

        let component = self.match_component(&text);
        let detected = self
            .tiers
            .iter()
            .find(|(_, matcher)| matcher.is_match(&text))
            .map(|(priority, _)| *priority);
        let security = self.security.is_match(&text);

        let mut priority = detected.unwrap_or(Priority::Normal);
        if security && priority < Priority::High {
            priority = Priority::High;
        }

        let result = AnalysisResult::new(component, priority, detected.is_some(), security);
        trace!(
            labels = ?result.labels(),
            confidence = result.confidence(),
            "issue analyzed"
        );
        result
    }

    /// Analyzes an issue whose title or body may be missing.
    #[must_use]
    pub fn analyze_optional(&self, title: Option<&str>, body: Option<&str>) -> AnalysisResult {
        self.analyze(title.unwrap_or_default(), body.unwrap_or_default())
    }

    fn match_component(&self, text: &str) -> Option<(String, ComponentSource)> {
        if let Some((_, id)) = self.paths.iter().find(|(pattern, _)| text.contains(pattern.as_str())) {
            return Some((id.clone(), ComponentSource::Path));
        }
        self.components
            .iter()
            .find(|(_, matcher)| matcher.is_match(text))
            .map(|(id, _)| (id.clone(), ComponentSource::Keyword))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::shared().clone()
    }
}

/// Joins title and body, caps the length at a char boundary and lowercases.
fn scan_text(title: &str, body: &str) -> String {
    let mut combined = String::with_capacity((title.len() + body.len() + 1).min(MAX_SCAN_BYTES));
    combined.push_str(title);
    combined.push('\n');
    combined.push_str(body);

    if combined.len() > MAX_SCAN_BYTES {
        let mut end = MAX_SCAN_BYTES;
        while !combined.is_char_boundary(end) {
            end -= 1;
        }
        combined.truncate(end);
    }
    combined.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ComponentKeywords;
    use crate::types::SECURITY_LABEL;
    use proptest::prelude::*;
    use test_case::test_case;

    fn analyze(title: &str, body: &str) -> AnalysisResult {
        Analyzer::shared().analyze(title, body)
    }

    mod component_tests {
        use super::*;

        #[test]
        fn path_match_beats_keywords() {
            let result = analyze("Crash in src/db/pool.rs", "The API call hangs");
            assert_eq!(result.components(), ["database".to_string()]);
            assert_eq!(result.component_source(), Some(ComponentSource::Path));
        }

        #[test]
        fn first_keyword_group_wins() {
            // "login" (auth) and "page" (frontend) both match; auth is listed first.
            let result = analyze("Login page is blank", "");
            assert_eq!(result.components(), ["auth".to_string()]);
            assert_eq!(result.component_source(), Some(ComponentSource::Keyword));
        }

        #[test]
        fn keywords_match_whole_words_only() {
            // "rapid" contains "api" but is not the word.
            let result = analyze("Rapid clicks", "");
            assert!(result.components().is_empty());
        }

        #[test]
        fn phrases_match_as_substrings() {
            let result = analyze("Possible memory leak", "");
            assert_eq!(result.components(), ["performance".to_string()]);
        }

        #[test]
        fn matching_is_case_insensitive() {
            let result = analyze("GRAPHQL schema", "");
            assert!(result.labels().contains("component:api"));
        }
    }

    mod priority_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("App crash on start", Priority::Critical ; "critical")]
        #[test_case("Export is broken", Priority::High ; "high")]
        #[test_case("Minor alignment issue", Priority::Low ; "low")]
        #[test_case("Add dark mode", Priority::Normal ; "none")]
        #[test_case("Minor crash", Priority::Critical ; "critical tier checked first")]
        fn tiers(title: &str, expected: Priority) {
            assert_eq!(analyze(title, "").priority(), expected);
        }

        #[test]
        fn normal_priority_emits_no_label() {
            let result = analyze("Add dark mode", "");
            assert!(result.labels().iter().all(|l| !l.starts_with("priority:")));
        }
    }

    mod security_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("Minor XSS in footer" ; "low raised")]
        #[test_case("XSS in footer" ; "normal raised")]
        fn security_raises_to_high(title: &str) {
            let result = analyze(title, "");
            assert!(result.security_flag());
            assert_eq!(result.priority(), Priority::High);
            assert!(result.labels().contains(SECURITY_LABEL));
            assert!(result.labels().contains("priority:high"));
        }

        #[test]
        fn security_keeps_critical() {
            let result = analyze("Outage caused by exploit", "");
            assert_eq!(result.priority(), Priority::Critical);
            assert!(result.labels().contains(SECURITY_LABEL));
        }

        #[test]
        fn matched_text_is_not_interpreted() {
            let result = analyze("$(rm -rf /) <script>alert(1)</script>", "`; DROP TABLE issues; --`");
            assert!(result.confidence() <= 1.0);
        }
    }

    mod confidence_tests {
        use super::*;

        #[test]
        fn confidence_accumulates() {
            assert!(analyze("", "").confidence().abs() < f64::EPSILON);
            assert!((analyze("Login help", "").confidence() - 0.4).abs() < 1e-9);
            assert!((analyze("Login broken", "").confidence() - 0.7).abs() < 1e-9);
            assert!((analyze("Login broken, token leaked", "").confidence() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn security_override_does_not_count_as_priority_match() {
            let result = analyze("XSS", "");
            assert!((result.confidence() - 0.3).abs() < 1e-9);
        }
    }

    mod default_rules_tests {
        use super::*;

        #[test]
        fn default_rules_compile() {
            assert!(Analyzer::new(AnalyzerRules::default()).is_ok());
        }

        #[test]
        fn inert_analyzer_labels_nothing() {
            let result = Analyzer::inert().analyze(
                "Login page crashes on submit",
                "token leaked in logs",
            );
            assert!(result.is_empty());
            assert!(!result.security_flag());
            assert_eq!(result.priority(), Priority::Normal);
        }
    }

    mod input_tests {
        use super::*;

        #[test]
        fn empty_and_missing_input() {
            assert!(analyze("", "").is_empty());
            assert!(Analyzer::shared().analyze_optional(None, None).is_empty());
            let result = Analyzer::shared().analyze_optional(Some("Login broken"), None);
            assert!(!result.is_empty());
        }

        #[test]
        fn text_past_scan_limit_is_ignored() {
            let body = format!("{}security", "a ".repeat(MAX_SCAN_BYTES));
            assert!(!analyze("", &body).security_flag());
        }

        #[test]
        fn truncation_respects_char_boundaries() {
            let body = "é".repeat(MAX_SCAN_BYTES);
            let result = analyze("x", &body);
            assert!(result.is_empty());
        }

        #[test]
        fn custom_rules() {
            let rules = AnalyzerRules {
                paths: Vec::new(),
                components: vec![ComponentKeywords {
                    component: "billing".to_string(),
                    keywords: vec!["invoice".to_string()],
                }],
                ..AnalyzerRules::default()
            };
            let analyzer = Analyzer::new(rules).unwrap();
            assert_eq!(
                analyzer.analyze("Invoice totals", "").components(),
                ["billing".to_string()]
            );
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_analyze_is_total(title in ".{0,200}", body in ".{0,2000}") {
            let result = analyze(&title, &body);
            prop_assert!((0.0..=1.0).contains(&result.confidence()));
            prop_assert!(result.components().len() <= 1);
        }

        #[test]
        fn prop_security_never_below_high(prefix in "[a-z ]{0,50}") {
            let result = analyze(&format!("{prefix} vulnerability"), "");
            prop_assert!(result.priority() >= Priority::High);
        }
    }
}
