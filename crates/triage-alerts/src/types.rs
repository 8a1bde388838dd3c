//! Core types for the alerting engine.
//!
//! - [`AlertLevel`]: severity of an alert
//! - [`ComparisonOperator`]: how an observation is compared to a threshold
//! - [`ThresholdRule`]: warning/critical thresholds for one (component, metric)
//! - [`Observation`] and [`EvaluationInput`]: what the engine evaluates
//! - [`Alert`]: an emitted alert, active until resolved

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_health::{HealthSnapshot, HealthStatus};
use triage_metrics::{MetricsSnapshot, TimeRange};
use uuid::Uuid;

use crate::error::{AlertError, Result};

/// Component wildcard matching every component.
pub const ANY_COMPONENT: &str = "*";

/// Metric name used for health-status observations.
pub const STATUS_METRIC: &str = "status";

/// The severity level of an alert.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational, no action required.
    Info,
    /// Should be investigated.
    #[default]
    Warning,
    /// Requires immediate attention.
    Critical,
}

impl AlertLevel {
    /// Returns the level as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used for de-duplication and cooldowns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    /// Component name.
    pub component: String,
    /// Metric name.
    pub metric: String,
}

impl AlertKey {
    /// Creates a key.
    #[must_use]
    pub fn new(component: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            metric: metric.into(),
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.metric)
    }
}

/// Comparison operators for thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// Greater than (>).
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal (>=).
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Less than (<).
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal (<=).
    #[serde(rename = "<=")]
    LessThanOrEqual,
}

impl ComparisonOperator {
    /// Returns true if `value` breaches `threshold`.
    #[must_use]
    pub fn breached(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterThanOrEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessThanOrEqual => value <= threshold,
        }
    }

    /// Returns true for the "higher is worse" operators.
    #[must_use]
    pub const fn is_upper_bound(&self) -> bool {
        matches!(self, Self::GreaterThan | Self::GreaterThanOrEqual)
    }

    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }

    /// Returns the operator in words, for alert messages.
    #[must_use]
    pub const fn as_phrase(&self) -> &'static str {
        match self {
            Self::GreaterThan => "above",
            Self::GreaterThanOrEqual => "at or above",
            Self::LessThan => "below",
            Self::LessThanOrEqual => "at or below",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// Warning and critical thresholds for one (component, metric) pair.
///
/// `component` may be [`ANY_COMPONENT`] to match every component reporting
/// the metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Component name or `*`.
    pub component: String,
    /// Metric name.
    pub metric: String,
    /// Comparison applied to both thresholds.
    pub operator: ComparisonOperator,
    /// Threshold for a warning alert.
    pub warning: Option<f64>,
    /// Threshold for a critical alert.
    pub critical: Option<f64>,
    /// Whether the rule is evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl ThresholdRule {
    /// Creates a validated rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if names are empty, no threshold is
    /// set, a threshold is not finite, or the warning threshold is beyond the
    /// critical one.
    pub fn new(
        component: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOperator,
        warning: Option<f64>,
        critical: Option<f64>,
    ) -> Result<Self> {
        let rule = Self {
            component: component.into(),
            metric: metric.into(),
            operator,
            warning,
            critical,
            enabled: true,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Validates the rule.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn validate(&self) -> Result<()> {
        if self.component.trim().is_empty() || self.metric.trim().is_empty() {
            return Err(AlertError::invalid_rule("component and metric must be non-empty"));
        }
        if self.warning.is_none() && self.critical.is_none() {
            return Err(AlertError::invalid_rule(format!(
                "rule {}/{} has no threshold",
                self.component, self.metric
            )));
        }
        if self.warning.into_iter().chain(self.critical).any(|t| !t.is_finite()) {
            return Err(AlertError::invalid_rule(format!(
                "rule {}/{} has a non-finite threshold",
                self.component, self.metric
            )));
        }
        if let (Some(warning), Some(critical)) = (self.warning, self.critical) {
            let ordered = if self.operator.is_upper_bound() {
                warning <= critical
            } else {
                warning >= critical
            };
            if !ordered {
                return Err(AlertError::invalid_rule(format!(
                    "rule {}/{}: warning threshold {warning} is beyond critical threshold {critical}",
                    self.component, self.metric
                )));
            }
        }
        Ok(())
    }

    /// Sets whether the rule is evaluated.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if the rule applies to the observation.
    #[must_use]
    pub fn matches(&self, observation: &Observation) -> bool {
        self.enabled
            && self.metric == observation.metric
            && (self.component == ANY_COMPONENT || self.component == observation.component)
    }

    /// Classifies a value, returning the breached level and its threshold.
    ///
    /// Critical is checked first.
    #[must_use]
    pub fn classify(&self, value: f64) -> Option<(AlertLevel, f64)> {
        if !value.is_finite() {
            return None;
        }
        [
            (AlertLevel::Critical, self.critical),
            (AlertLevel::Warning, self.warning),
        ]
        .into_iter()
        .find_map(|(level, threshold)| {
            threshold
                .filter(|t| self.operator.breached(value, *t))
                .map(|t| (level, t))
        })
    }

    /// The built-in rule set.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        use ComparisonOperator::{GreaterThan, GreaterThanOrEqual, LessThan};

        let rule = |component: &str, metric: &str, operator, warning, critical| Self {
            component: component.to_string(),
            metric: metric.to_string(),
            operator,
            warning: Some(warning),
            critical: Some(critical),
            enabled: true,
        };

        vec![
            rule("api", "error_rate", GreaterThan, 0.05, 0.25),
            rule("api", "response_time_ms", GreaterThan, 2000.0, 5000.0),
            rule("api", "quota_remaining", LessThan, 500.0, 100.0),
            rule("analysis", "accuracy", LessThan, 0.85, 0.7),
            rule("errors", "errors_per_minute", GreaterThan, 5.0, 20.0),
            rule("resources", "memory_percent", GreaterThan, 80.0, 95.0),
            rule("performance", "p95_duration_ms", GreaterThan, 5000.0, 15000.0),
            rule(
                ANY_COMPONENT,
                STATUS_METRIC,
                GreaterThanOrEqual,
                f64::from(HealthStatus::Degraded.severity()),
                f64::from(HealthStatus::Unhealthy.severity()),
            ),
        ]
    }
}

/// One measured value for a (component, metric) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Component name.
    pub component: String,
    /// Metric name.
    pub metric: String,
    /// Measured value.
    pub value: f64,
}

impl Observation {
    /// Creates an observation.
    #[must_use]
    pub fn new(component: impl Into<String>, metric: impl Into<String>, value: f64) -> Self {
        Self {
            component: component.into(),
            metric: metric.into(),
            value,
        }
    }

    /// The observation's alert key.
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey::new(&self.component, &self.metric)
    }
}

/// A snapshot handed to [`AlertEngine::evaluate`](crate::AlertEngine::evaluate).
#[derive(Debug, Clone, Copy)]
pub enum EvaluationInput<'a> {
    /// A health cycle result; each component reports its status severity.
    Health(&'a HealthSnapshot),
    /// A metrics window; only statistics with data are observed.
    Metrics(&'a MetricsSnapshot),
}

impl EvaluationInput<'_> {
    /// Flattens the snapshot into observations.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        match self {
            Self::Health(snapshot) => snapshot
                .components
                .iter()
                .map(|c| Observation::new(&c.name, STATUS_METRIC, f64::from(c.status.severity())))
                .collect(),
            Self::Metrics(snapshot) => [
                ("api", "error_rate", snapshot.api.error_rate),
                ("api", "response_time_ms", snapshot.api.p95_response_ms),
                (
                    "api",
                    "quota_remaining",
                    snapshot.api.min_rate_limit_remaining.map(f64::from),
                ),
                ("analysis", "accuracy", snapshot.labeling.accuracy),
                ("errors", "errors_per_minute", snapshot.errors.errors_per_minute),
                ("resources", "memory_percent", snapshot.system.latest_memory_percent),
                ("performance", "p95_duration_ms", snapshot.performance.p95_duration_ms),
            ]
            .into_iter()
            .filter_map(|(component, metric, value)| {
                value.map(|v| Observation::new(component, metric, v))
            })
            .collect(),
        }
    }
}

/// An emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: Uuid,
    /// Severity.
    pub level: AlertLevel,
    /// Component name.
    pub component: String,
    /// Metric name.
    pub metric: String,
    /// Plain-language description of the breach.
    pub message: String,
    /// Observed value.
    pub value: f64,
    /// Breached threshold.
    pub threshold: f64,
    /// When the alert was emitted.
    pub created_at: DateTime<Utc>,
    /// Whether the alert has been resolved.
    pub resolved: bool,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates an active alert for a breached rule.
    #[must_use]
    pub fn new(
        observation: &Observation,
        rule: &ThresholdRule,
        level: AlertLevel,
        threshold: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            component: observation.component.clone(),
            metric: observation.metric.clone(),
            message: describe(observation, rule.operator, level, threshold),
            value: observation.value,
            threshold,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    /// The alert's key.
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey::new(&self.component, &self.metric)
    }

    /// Returns true until resolved.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Marks the alert resolved. Returns false if it already was.
    pub(crate) fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        true
    }

    /// Time from emission to resolution.
    #[must_use]
    pub fn resolution_time(&self) -> Option<Duration> {
        self.resolved_at
            .and_then(|at| (at - self.created_at).to_std().ok())
    }
}

fn status_name(severity: f64) -> &'static str {
    match severity {
        s if s >= f64::from(HealthStatus::Unhealthy.severity()) => HealthStatus::Unhealthy.as_str(),
        s if s >= f64::from(HealthStatus::Degraded.severity()) => HealthStatus::Degraded.as_str(),
        _ => HealthStatus::Healthy.as_str(),
    }
}

fn describe(
    observation: &Observation,
    operator: ComparisonOperator,
    level: AlertLevel,
    threshold: f64,
) -> String {
    if observation.metric == STATUS_METRIC {
        return format!(
            "{} health check reports {} ({level} when {} or worse)",
            observation.component,
            status_name(observation.value),
            status_name(threshold),
        );
    }
    format!(
        "{} {} is {}, {} the {level} threshold of {}",
        observation.component,
        observation.metric.replace('_', " "),
        format_value(observation.value),
        operator.as_phrase(),
        format_value(threshold),
    )
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Criteria for alert queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    /// Only this component.
    pub component: Option<String>,
    /// Only this level.
    pub level: Option<AlertLevel>,
    /// Only alerts created in this range.
    pub range: Option<TimeRange>,
}

impl AlertFilter {
    /// A filter matching every alert.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a component.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Restricts to a level.
    #[must_use]
    pub const fn level(mut self, level: AlertLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Restricts to a creation time range.
    #[must_use]
    pub const fn range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Returns true if the alert satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        self.component.as_ref().is_none_or(|c| *c == alert.component)
            && self.level.is_none_or(|l| l == alert.level)
            && self
                .range
                .is_none_or(|r| r.contains(alert.created_at.timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;
    use triage_health::ComponentHealth;
    use triage_metrics::{ApiUsageSummary, SystemSummary};

    fn error_rate_rule() -> ThresholdRule {
        ThresholdRule::new(
            "api",
            "error_rate",
            ComparisonOperator::GreaterThan,
            Some(0.05),
            Some(0.25),
        )
        .unwrap()
    }

    mod operator_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(ComparisonOperator::GreaterThan, 10.0, 5.0, true)]
        #[test_case(ComparisonOperator::GreaterThan, 5.0, 5.0, false)]
        #[test_case(ComparisonOperator::GreaterThanOrEqual, 5.0, 5.0, true)]
        #[test_case(ComparisonOperator::LessThan, 4.0, 5.0, true)]
        #[test_case(ComparisonOperator::LessThan, 5.0, 5.0, false)]
        #[test_case(ComparisonOperator::LessThanOrEqual, 5.0, 5.0, true)]
        fn breached(op: ComparisonOperator, value: f64, threshold: f64, expected: bool) {
            assert_eq!(op.breached(value, threshold), expected);
        }

        #[test]
        fn serializes_as_symbol() {
            assert_eq!(
                serde_json::to_string(&ComparisonOperator::LessThanOrEqual).unwrap(),
                "\"<=\""
            );
        }
    }

    mod rule_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn critical_checked_before_warning() {
            let rule = error_rate_rule();
            assert_eq!(rule.classify(0.30), Some((AlertLevel::Critical, 0.25)));
            assert_eq!(rule.classify(0.10), Some((AlertLevel::Warning, 0.05)));
            assert_eq!(rule.classify(0.01), None);
            assert_eq!(rule.classify(f64::NAN), None);
        }

        #[test]
        fn lower_bound_rule() {
            let rule = ThresholdRule::new(
                "analysis",
                "accuracy",
                ComparisonOperator::LessThan,
                Some(0.85),
                Some(0.7),
            )
            .unwrap();
            assert_eq!(rule.classify(0.8), Some((AlertLevel::Warning, 0.85)));
            assert_eq!(rule.classify(0.5), Some((AlertLevel::Critical, 0.7)));
        }

        #[test_case("", "m", Some(1.0), None ; "empty component")]
        #[test_case("c", "m", None, None ; "no threshold")]
        #[test_case("c", "m", Some(f64::INFINITY), None ; "infinite")]
        #[test_case("c", "m", Some(10.0), Some(5.0) ; "inverted")]
        fn invalid_rules(component: &str, metric: &str, warning: Option<f64>, critical: Option<f64>) {
            assert!(
                ThresholdRule::new(component, metric, ComparisonOperator::GreaterThan, warning, critical)
                    .is_err()
            );
        }

        #[test]
        fn defaults_are_valid() {
            for rule in ThresholdRule::defaults() {
                rule.validate().unwrap();
            }
        }

        #[test]
        fn wildcard_matches_any_component() {
            let rule = ThresholdRule::defaults()
                .into_iter()
                .find(|r| r.component == ANY_COMPONENT)
                .unwrap();
            assert!(rule.matches(&Observation::new("api", STATUS_METRIC, 2.0)));
            assert!(!rule.matches(&Observation::new("api", "error_rate", 2.0)));
            assert!(!rule.clone().enabled(false).matches(&Observation::new("api", STATUS_METRIC, 2.0)));
        }

        proptest! {
            #[test]
            fn classified_threshold_is_always_breached(value in -1.0e6f64..1.0e6) {
                let rule = error_rate_rule();
                if let Some((_, threshold)) = rule.classify(value) {
                    prop_assert!(rule.operator.breached(value, threshold));
                }
            }
        }
    }

    mod input_tests {
        use super::*;

        #[test]
        fn health_input_observes_every_component() {
            let snapshot = HealthSnapshot::new(vec![
                ComponentHealth::healthy("analysis"),
                ComponentHealth::unhealthy("api", "timed out"),
            ]);
            let observations = EvaluationInput::Health(&snapshot).observations();
            assert_eq!(observations.len(), 2);
            assert_eq!(observations[1], Observation::new("api", STATUS_METRIC, 2.0));
        }

        #[test]
        fn metrics_input_skips_missing_data() {
            let snapshot = MetricsSnapshot {
                taken_at: Utc::now(),
                window_secs: 300,
                labeling: Default::default(),
                api: ApiUsageSummary {
                    count: 10,
                    error_rate: Some(0.3),
                    min_rate_limit_remaining: Some(42),
                    ..Default::default()
                },
                performance: Default::default(),
                errors: Default::default(),
                system: SystemSummary::default(),
            };
            let observations = EvaluationInput::Metrics(&snapshot).observations();
            assert_eq!(
                observations,
                vec![
                    Observation::new("api", "error_rate", 0.3),
                    Observation::new("api", "quota_remaining", 42.0),
                ]
            );
        }
    }

    mod alert_tests {
        use super::*;

        #[test]
        fn message_states_metric_and_threshold() {
            let rule = error_rate_rule();
            let observation = Observation::new("api", "error_rate", 0.3);
            let alert = Alert::new(&observation, &rule, AlertLevel::Critical, 0.25);
            assert_eq!(
                alert.message,
                "api error rate is 0.30, above the critical threshold of 0.25"
            );
            assert!(alert.is_active());
        }

        #[test]
        fn status_message_names_the_status() {
            let rule = ThresholdRule::defaults().pop().unwrap();
            let observation = Observation::new("api", STATUS_METRIC, 2.0);
            let alert = Alert::new(&observation, &rule, AlertLevel::Critical, 2.0);
            assert_eq!(
                alert.message,
                "api health check reports unhealthy (critical when unhealthy or worse)"
            );
        }

        #[test]
        fn resolve_only_once() {
            let observation = Observation::new("api", "error_rate", 0.3);
            let mut alert = Alert::new(&observation, &error_rate_rule(), AlertLevel::Critical, 0.25);
            let at = alert.created_at + chrono::TimeDelta::seconds(90);
            assert!(alert.resolve(at));
            assert!(!alert.resolve(at + chrono::TimeDelta::seconds(10)));
            assert_eq!(alert.resolved_at, Some(at));
            assert_eq!(alert.resolution_time(), Some(Duration::from_secs(90)));
        }

        #[test]
        fn filter_matches() {
            let observation = Observation::new("api", "error_rate", 0.3);
            let alert = Alert::new(&observation, &error_rate_rule(), AlertLevel::Critical, 0.25);
            assert!(AlertFilter::all().matches(&alert));
            assert!(AlertFilter::all().component("api").level(AlertLevel::Critical).matches(&alert));
            assert!(!AlertFilter::all().component("analysis").matches(&alert));
            assert!(!AlertFilter::all().level(AlertLevel::Warning).matches(&alert));
            assert!(AlertFilter::all().range(TimeRange::last_minutes(5)).matches(&alert));
        }
    }
}
