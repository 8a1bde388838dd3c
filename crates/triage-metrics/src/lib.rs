//! In-memory metrics for issue triage automation.
#![forbid(unsafe_code)]
//!
//! `triage-metrics` records typed events from the triage pipeline (labeling
//! outcomes, provider calls, timed operations, failures, tracker activity and
//! resource samples) and answers aggregate queries over arbitrary time ranges.
//!
//! # Features
//!
//! - **Validated events**: malformed payloads are rejected before storage
//! - **Minute buckets**: raw events are partitioned by category and minute
//! - **Rollups**: hourly and daily summaries outlive the raw data
//! - **Retention**: a background task compacts and evicts on an interval
//!
//! # Example
//!
//! ```rust
//! use triage_metrics::{EventData, MetricCategory, MetricsCollector, PerformanceEvent, TimeRange};
//!
//! let collector = MetricsCollector::new();
//! collector
//!     .record_now(EventData::Performance(PerformanceEvent {
//!         operation: "analyze".to_string(),
//!         duration_ms: 12.5,
//!         memory_bytes: None,
//!     }))
//!     .unwrap();
//!
//! let summary = collector.query(MetricCategory::Performance, TimeRange::last_minutes(5));
//! assert_eq!(summary.count(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/triage-metrics/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod collector;
pub mod error;
pub mod query;
pub mod rollup;
pub mod storage;
pub mod types;

pub use collector::{CompactionReport, MetricsCollector, MetricsConfig, MetricsExport, MetricsSnapshot};
pub use error::{MetricsError, Result};
pub use query::{
    mean, percentile, summarize, AggregateSummary, ApiUsageSummary, EngagementSummary,
    ErrorSummary, LabelingSummary, PerformanceSummary, SystemSummary,
};
pub use rollup::{Rollup, RollupKey, RollupStore};
pub use storage::EventStore;
pub use types::{
    now_millis, ApiUsageEvent, AutoLabelingEvent, EngagementEvent, EngagementKind, ErrorEvent,
    EventData, Granularity, MetricCategory, MetricEvent, PerformanceEvent, SystemEvent, TimeRange,
    MAX_TIMESTAMP_MILLIS,
};
