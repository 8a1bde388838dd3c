//! Core types for the metrics system.
//!
//! This module provides the fundamental types used throughout the triage-metrics crate:
//! - [`MetricEvent`]: A single recorded event with a timestamp and category payload
//! - [`EventData`]: The category-specific payload, validated at construction
//! - [`MetricCategory`]: The six event categories the collector partitions by
//! - [`Granularity`]: Bucketing keys (minute, hour, day) derived from timestamps
//! - [`TimeRange`]: A time range for queries

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

const MINUTE_MILLIS: i64 = 60_000;
const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;

/// Latest accepted event timestamp, 9999-12-31T23:59:59.999Z.
pub const MAX_TIMESTAMP_MILLIS: i64 = 253_402_300_799_999;

/// Returns the current timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The category an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    /// Outcome of an automatic labeling pass.
    AutoLabeling,
    /// A call to the ticketing provider.
    ApiUsage,
    /// A timed operation.
    Performance,
    /// A recorded failure.
    Error,
    /// User activity on the tracker (issues, comments, label changes).
    Engagement,
    /// Process resource sample.
    System,
}

impl MetricCategory {
    /// All categories, in storage order.
    pub const ALL: [Self; 6] = [
        Self::AutoLabeling,
        Self::ApiUsage,
        Self::Performance,
        Self::Error,
        Self::Engagement,
        Self::System,
    ];

    /// Returns the category as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoLabeling => "auto_labeling",
            Self::ApiUsage => "api_usage",
            Self::Performance => "performance",
            Self::Error => "error",
            Self::Engagement => "engagement",
            Self::System => "system",
        }
    }

    /// Returns the storage slot of this category.
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::AutoLabeling => 0,
            Self::ApiUsage => 1,
            Self::Performance => 2,
            Self::Error => 3,
            Self::Engagement => 4,
            Self::System => 5,
        }
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one automatic labeling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLabelingEvent {
    /// The issue that was labeled.
    pub issue_number: u64,
    /// Labels applied to the issue.
    pub labels: Vec<String>,
    /// Analyzer confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the labels were later confirmed correct, when known.
    pub correct: Option<bool>,
    /// Time spent analyzing, in milliseconds.
    pub processing_ms: f64,
}

/// One call to the ticketing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageEvent {
    /// The operation or endpoint name.
    pub endpoint: String,
    /// HTTP status code returned (or mapped from the error kind).
    pub status_code: u16,
    /// Round-trip time in milliseconds.
    pub response_time_ms: f64,
    /// Remaining quota reported after the call, when known.
    pub rate_limit_remaining: Option<u32>,
}

impl ApiUsageEvent {
    /// Returns true if the status code denotes success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 400
    }
}

/// A timed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    /// The operation name.
    pub operation: String,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Resident memory at completion, in bytes.
    pub memory_bytes: Option<u64>,
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Component that failed.
    pub component: String,
    /// Short machine-readable kind (e.g. `authentication`, `network`).
    pub kind: String,
    /// Human-readable message. Must not carry credentials.
    pub message: String,
}

/// Kinds of tracker activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    /// An issue was opened.
    IssueOpened,
    /// An issue was closed.
    IssueClosed,
    /// A comment was posted.
    Comment,
    /// Labels were changed by a human.
    LabelChanged,
}

impl EngagementKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IssueOpened => "issue_opened",
            Self::IssueClosed => "issue_closed",
            Self::Comment => "comment",
            Self::LabelChanged => "label_changed",
        }
    }
}

/// Tracker activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    /// What happened.
    pub kind: EngagementKind,
    /// The issue involved, if any.
    pub issue_number: Option<u64>,
}

/// Process resource sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    /// Used memory in bytes.
    pub memory_used_bytes: u64,
    /// Total memory in bytes.
    pub memory_total_bytes: u64,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
}

impl SystemEvent {
    /// Returns memory usage as a percentage, or `None` if the total is unknown.
    #[must_use]
    pub fn memory_percent(&self) -> Option<f64> {
        (self.memory_total_bytes > 0)
            .then(|| self.memory_used_bytes as f64 / self.memory_total_bytes as f64 * 100.0)
    }
}

/// The category-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventData {
    /// See [`AutoLabelingEvent`].
    AutoLabeling(AutoLabelingEvent),
    /// See [`ApiUsageEvent`].
    ApiUsage(ApiUsageEvent),
    /// See [`PerformanceEvent`].
    Performance(PerformanceEvent),
    /// See [`ErrorEvent`].
    Error(ErrorEvent),
    /// See [`EngagementEvent`].
    Engagement(EngagementEvent),
    /// See [`SystemEvent`].
    System(SystemEvent),
}

impl EventData {
    /// Returns the category of this payload.
    #[must_use]
    pub const fn category(&self) -> MetricCategory {
        match self {
            Self::AutoLabeling(_) => MetricCategory::AutoLabeling,
            Self::ApiUsage(_) => MetricCategory::ApiUsage,
            Self::Performance(_) => MetricCategory::Performance,
            Self::Error(_) => MetricCategory::Error,
            Self::Engagement(_) => MetricCategory::Engagement,
            Self::System(_) => MetricCategory::System,
        }
    }

    /// Validates the payload.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Validation` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let category = self.category().as_str();
        match self {
            Self::AutoLabeling(e) => {
                if !e.confidence.is_finite() || !(0.0..=1.0).contains(&e.confidence) {
                    return Err(MetricsError::validation(
                        category,
                        format!("confidence {} outside [0, 1]", e.confidence),
                    ));
                }
                non_negative(category, "processing_ms", e.processing_ms)
            }
            Self::ApiUsage(e) => {
                if e.endpoint.trim().is_empty() {
                    return Err(MetricsError::validation(category, "endpoint cannot be empty"));
                }
                if !(100..=599).contains(&e.status_code) {
                    return Err(MetricsError::validation(
                        category,
                        format!("status code {} out of range", e.status_code),
                    ));
                }
                non_negative(category, "response_time_ms", e.response_time_ms)
            }
            Self::Performance(e) => {
                if e.operation.trim().is_empty() {
                    return Err(MetricsError::validation(category, "operation cannot be empty"));
                }
                non_negative(category, "duration_ms", e.duration_ms)
            }
            Self::Error(e) => {
                if e.component.trim().is_empty() || e.kind.trim().is_empty() {
                    return Err(MetricsError::validation(
                        category,
                        "component and kind cannot be empty",
                    ));
                }
                Ok(())
            }
            Self::Engagement(_) => Ok(()),
            Self::System(e) => {
                if e.memory_total_bytes > 0 && e.memory_used_bytes > e.memory_total_bytes {
                    return Err(MetricsError::validation(
                        category,
                        "used memory exceeds total memory",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn non_negative(category: &'static str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MetricsError::validation(
            category,
            format!("{field} must be a finite non-negative number, got {value}"),
        ))
    }
}

/// A recorded event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetricEvent")]
pub struct MetricEvent {
    /// Unix timestamp in milliseconds.
    timestamp: i64,
    /// The category payload.
    data: EventData,
}

impl MetricEvent {
    /// Creates a validated event at the given timestamp.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Validation` if the payload is malformed or the
    /// timestamp falls outside 1970-01-01 through 9999-12-31.
    pub fn new(timestamp: i64, data: EventData) -> Result<Self> {
        if !(0..=MAX_TIMESTAMP_MILLIS).contains(&timestamp) {
            return Err(MetricsError::validation(
                data.category().as_str(),
                format!("timestamp {timestamp} is outside the supported range"),
            ));
        }
        data.validate()?;
        Ok(Self { timestamp, data })
    }

    /// Creates a validated event stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Validation` if the payload is malformed.
    pub fn now(data: EventData) -> Result<Self> {
        Self::new(now_millis(), data)
    }

    /// Returns the event timestamp in milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the payload.
    #[must_use]
    pub const fn data(&self) -> &EventData {
        &self.data
    }

    /// Returns the category of this event.
    #[must_use]
    pub const fn category(&self) -> MetricCategory {
        self.data.category()
    }
}

#[derive(Deserialize)]
struct RawMetricEvent {
    timestamp: i64,
    data: EventData,
}

impl TryFrom<RawMetricEvent> for MetricEvent {
    type Error = MetricsError;

    fn try_from(raw: RawMetricEvent) -> Result<Self> {
        Self::new(raw.timestamp, raw.data)
    }
}

/// Bucketing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One-minute buckets (raw storage).
    Minute,
    /// One-hour rollups.
    Hour,
    /// One-day rollups.
    Day,
}

impl Granularity {
    /// Returns the bucket width in milliseconds.
    #[must_use]
    pub const fn width_millis(&self) -> i64 {
        match self {
            Self::Minute => MINUTE_MILLIS,
            Self::Hour => HOUR_MILLIS,
            Self::Day => DAY_MILLIS,
        }
    }

    /// Returns the start of the bucket containing `timestamp`.
    #[must_use]
    pub const fn bucket_start(&self, timestamp: i64) -> i64 {
        let width = self.width_millis();
        timestamp.div_euclid(width) * width
    }

    /// Returns the range covered by the bucket starting at `bucket_start`.
    #[must_use]
    pub const fn bucket_range(&self, bucket_start: i64) -> TimeRange {
        TimeRange {
            start: bucket_start,
            end: bucket_start + self.width_millis() - 1,
        }
    }
}

/// A time range for queries.
///
/// Both start and end are inclusive Unix timestamps in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds.
    pub start: i64,
    /// End timestamp (inclusive), in milliseconds.
    pub end: i64,
}

impl TimeRange {
    /// Creates a new time range.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidTimeRange` if start > end.
    pub const fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(MetricsError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a time range for the last N milliseconds from now.
    #[must_use]
    pub fn last_millis(millis: i64) -> Self {
        let now = now_millis();
        Self {
            start: now - millis,
            end: now,
        }
    }

    /// Creates a time range for the last N minutes from now.
    #[must_use]
    pub fn last_minutes(minutes: i64) -> Self {
        Self::last_millis(minutes * MINUTE_MILLIS)
    }

    /// Creates a time range for the last N hours from now.
    #[must_use]
    pub fn last_hours(hours: i64) -> Self {
        Self::last_millis(hours * HOUR_MILLIS)
    }

    /// Returns the duration of this time range in milliseconds.
    #[must_use]
    pub const fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// Returns the duration in minutes, at least one millisecond wide.
    #[must_use]
    pub fn duration_minutes(&self) -> f64 {
        (self.duration_millis().max(1)) as f64 / MINUTE_MILLIS as f64
    }

    /// Checks if a timestamp falls within this range (inclusive).
    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Checks if two ranges share at least one instant.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}
