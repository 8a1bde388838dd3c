//! Health status types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a component, ordered by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Working normally.
    #[default]
    Healthy,
    /// Working, but a threshold is breached.
    Degraded,
    /// Not working or not checkable.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Numeric severity: 0 healthy, 1 degraded, 2 unhealthy.
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Probe name.
    pub name: String,
    /// Status.
    pub status: HealthStatus,
    /// Reasons for a non-healthy status.
    pub errors: Vec<String>,
    /// The measurement the status was derived from, if any.
    pub sampled_metric: Option<f64>,
    /// When the check finished.
    pub checked_at: DateTime<Utc>,
    /// How long the check took.
    pub duration_ms: u64,
}

impl ComponentHealth {
    /// Creates a healthy entry.
    #[must_use]
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            errors: Vec::new(),
            sampled_metric: None,
            checked_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Creates a degraded entry with a reason.
    #[must_use]
    pub fn degraded(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            errors: vec![reason.into()],
            ..Self::healthy(name)
        }
    }

    /// Creates an unhealthy entry with a reason.
    #[must_use]
    pub fn unhealthy(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            errors: vec![reason.into()],
            ..Self::healthy(name)
        }
    }

    /// Attaches the sampled measurement.
    #[must_use]
    pub fn with_metric(mut self, value: f64) -> Self {
        self.sampled_metric = Some(value);
        self
    }

    /// Raises the status to at least `status`, recording the reason.
    pub fn escalate(&mut self, status: HealthStatus, reason: impl Into<String>) {
        self.status = self.status.max(status);
        self.errors.push(reason.into());
    }
}

/// One health cycle's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// When the cycle finished.
    pub taken_at: DateTime<Utc>,
    /// Worst status across components.
    pub overall: HealthStatus,
    /// Per-probe results, sorted by name.
    pub components: Vec<ComponentHealth>,
}

impl HealthSnapshot {
    /// Builds a snapshot, sorting components and reducing the overall status.
    #[must_use]
    pub fn new(mut components: Vec<ComponentHealth>) -> Self {
        components.sort_by(|a, b| a.name.cmp(&b.name));
        let overall = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or_default();
        Self {
            taken_at: Utc::now(),
            overall,
            components,
        }
    }

    /// Returns a component's result by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Returns true if every component is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.overall == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        assert!(HealthStatus::Unhealthy > HealthStatus::Degraded);
        assert!(HealthStatus::Degraded > HealthStatus::Healthy);
        assert_eq!(HealthStatus::Degraded.severity(), 1);
    }

    #[test]
    fn snapshot_takes_worst_status_and_sorts() {
        let snapshot = HealthSnapshot::new(vec![
            ComponentHealth::healthy("resources"),
            ComponentHealth::degraded("api", "slow"),
            ComponentHealth::healthy("analysis"),
        ]);
        assert_eq!(snapshot.overall, HealthStatus::Degraded);
        let names: Vec<_> = snapshot.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["analysis", "api", "resources"]);
    }

    #[test]
    fn empty_snapshot_is_healthy() {
        assert!(HealthSnapshot::new(Vec::new()).is_healthy());
    }

    #[test]
    fn escalate_never_lowers() {
        let mut health = ComponentHealth::unhealthy("api", "down");
        health.escalate(HealthStatus::Degraded, "slow");
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.errors.len(), 2);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }
}
