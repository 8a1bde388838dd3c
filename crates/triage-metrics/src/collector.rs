//! The metrics collector.
//!
//! [`MetricsCollector`] is the entry point producers record into and the
//! alerting and presentation layers query from. Clones share storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{MetricsError, Result};
use crate::query::{
    summarize, AggregateSummary, ApiUsageSummary, EngagementSummary, ErrorSummary,
    LabelingSummary, PerformanceSummary, SystemSummary,
};
use crate::rollup::{Rollup, RollupKey, RollupStore};
use crate::storage::EventStore;
use crate::types::{now_millis, EventData, Granularity, MetricCategory, MetricEvent, TimeRange};

const MIN_RAW_RETENTION_SECS: u64 = 86_400;

/// Configuration for the metrics collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How long raw events are kept (in seconds).
    pub raw_retention_secs: u64,
    /// How long hourly and daily rollups are kept (in seconds).
    pub rollup_retention_secs: u64,
    /// How often the compaction task runs (in seconds).
    pub compaction_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            raw_retention_secs: 48 * 3600,      // 2 days
            rollup_retention_secs: 30 * 86_400, // 30 days
            compaction_interval_secs: 300,
        }
    }
}

impl MetricsConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidConfig` for zero intervals, a raw
    /// retention too short to build daily rollups, or a rollup retention
    /// shorter than the raw retention.
    pub fn validate(&self) -> Result<()> {
        if self.compaction_interval_secs == 0 {
            return Err(MetricsError::InvalidConfig {
                reason: "compaction interval must be positive".to_string(),
            });
        }
        // Daily rollups are built from raw events, so a whole day plus one
        // compaction pass must still be on hand when the day closes.
        let min_raw = MIN_RAW_RETENTION_SECS.saturating_add(self.compaction_interval_secs);
        if self.raw_retention_secs < min_raw {
            return Err(MetricsError::InvalidConfig {
                reason: "raw retention must cover one day plus the compaction interval"
                    .to_string(),
            });
        }
        if self.rollup_retention_secs < self.raw_retention_secs {
            return Err(MetricsError::InvalidConfig {
                reason: "rollup retention cannot be shorter than raw retention".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the compaction interval.
    #[must_use]
    pub const fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }

    fn raw_retention_millis(&self) -> i64 {
        (self.raw_retention_secs as i64).saturating_mul(1000)
    }

    fn rollup_retention_millis(&self) -> i64 {
        (self.rollup_retention_secs as i64).saturating_mul(1000)
    }
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    /// Rollups computed in this pass.
    pub rollups_created: usize,
    /// Raw events evicted.
    pub raw_evicted: usize,
    /// Rollups evicted.
    pub rollups_evicted: usize,
}

/// Headline metrics over a recent window, consumed by the alerting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Window width in seconds.
    pub window_secs: u64,
    /// Labeling outcomes.
    pub labeling: LabelingSummary,
    /// Provider usage.
    pub api: ApiUsageSummary,
    /// Timed operations.
    pub performance: PerformanceSummary,
    /// Failures.
    pub errors: ErrorSummary,
    /// Resource samples.
    pub system: SystemSummary,
}

/// Read-only export for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    /// When the export was generated.
    pub generated_at: DateTime<Utc>,
    /// The exported range.
    pub range: TimeRange,
    /// One summary per category over the whole range.
    pub summaries: Vec<AggregateSummary>,
    /// Hourly rollups overlapping the range.
    pub hourly: Vec<Rollup>,
    /// Daily rollups overlapping the range.
    pub daily: Vec<Rollup>,
}

/// Records events and answers aggregate queries.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    config: MetricsConfig,
    store: Arc<EventStore>,
    rollups: Arc<RollupStore>,
}

impl MetricsCollector {
    /// Creates a collector with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MetricsConfig::default(),
            store: Arc::new(EventStore::new()),
            rollups: Arc::new(RollupStore::new()),
        }
    }

    /// Creates a collector with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidConfig` if the configuration is invalid.
    pub fn with_config(config: MetricsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Records an event.
    pub fn record(&self, event: MetricEvent) {
        self.store.insert(event);
    }

    /// Validates a payload, stamps it with the current time and records it.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Validation` if the payload is malformed; nothing is recorded.
    pub fn record_now(&self, data: EventData) -> Result<()> {
        let event = MetricEvent::now(data)?;
        self.record(event);
        Ok(())
    }

    /// Returns the number of raw events held for a category.
    #[must_use]
    pub fn event_count(&self, category: MetricCategory) -> usize {
        self.store.count(category)
    }

    /// Summarizes a category over a range.
    #[must_use]
    pub fn query(&self, category: MetricCategory, range: TimeRange) -> AggregateSummary {
        let events = self.store.events_in(category, range);
        summarize(category, &events, range)
    }

    /// Summarizes labeling outcomes over a range.
    #[must_use]
    pub fn labeling(&self, range: TimeRange) -> LabelingSummary {
        match self.query(MetricCategory::AutoLabeling, range) {
            AggregateSummary::AutoLabeling(s) => s,
            _ => LabelingSummary::default(),
        }
    }

    /// Summarizes provider usage over a range.
    #[must_use]
    pub fn api_usage(&self, range: TimeRange) -> ApiUsageSummary {
        match self.query(MetricCategory::ApiUsage, range) {
            AggregateSummary::ApiUsage(s) => s,
            _ => ApiUsageSummary::default(),
        }
    }

    /// Summarizes timed operations over a range.
    #[must_use]
    pub fn performance(&self, range: TimeRange) -> PerformanceSummary {
        match self.query(MetricCategory::Performance, range) {
            AggregateSummary::Performance(s) => s,
            _ => PerformanceSummary::default(),
        }
    }

    /// Summarizes failures over a range.
    #[must_use]
    pub fn errors(&self, range: TimeRange) -> ErrorSummary {
        match self.query(MetricCategory::Error, range) {
            AggregateSummary::Error(s) => s,
            _ => ErrorSummary::default(),
        }
    }

    /// Summarizes tracker activity over a range.
    #[must_use]
    pub fn engagement(&self, range: TimeRange) -> EngagementSummary {
        match self.query(MetricCategory::Engagement, range) {
            AggregateSummary::Engagement(s) => s,
            _ => EngagementSummary::default(),
        }
    }

    /// Summarizes resource samples over a range.
    #[must_use]
    pub fn system(&self, range: TimeRange) -> SystemSummary {
        match self.query(MetricCategory::System, range) {
            AggregateSummary::System(s) => s,
            _ => SystemSummary::default(),
        }
    }

    /// Returns stored rollups overlapping a range.
    #[must_use]
    pub fn rollups(
        &self,
        category: MetricCategory,
        granularity: Granularity,
        range: TimeRange,
    ) -> Vec<Rollup> {
        self.rollups.query(category, granularity, range)
    }

    /// Takes a snapshot of the headline metrics over the trailing window.
    #[must_use]
    pub fn snapshot(&self, window: Duration) -> MetricsSnapshot {
        let range = TimeRange::last_millis(window.as_millis() as i64);
        MetricsSnapshot {
            taken_at: Utc::now(),
            window_secs: window.as_secs(),
            labeling: self.labeling(range),
            api: self.api_usage(range),
            performance: self.performance(range),
            errors: self.errors(range),
            system: self.system(range),
        }
    }

    /// Exports summaries and rollups for a range.
    #[must_use]
    pub fn export(&self, range: TimeRange) -> MetricsExport {
        let summaries = MetricCategory::ALL
            .iter()
            .map(|c| self.query(*c, range))
            .collect();
        let rollups_for = |granularity| {
            MetricCategory::ALL
                .iter()
                .flat_map(|c| self.rollups.query(*c, granularity, range))
                .collect()
        };

        MetricsExport {
            generated_at: Utc::now(),
            range,
            summaries,
            hourly: rollups_for(Granularity::Hour),
            daily: rollups_for(Granularity::Day),
        }
    }

    /// Builds missing rollups for completed buckets, then evicts expired data.
    pub fn compact(&self, now: i64) -> CompactionReport {
        let mut report = CompactionReport::default();

        for granularity in [Granularity::Hour, Granularity::Day] {
            let current = granularity.bucket_start(now);

            for category in MetricCategory::ALL {
                let completed = self
                    .store
                    .bucket_starts(category, granularity)
                    .into_iter()
                    .filter(|bucket| *bucket < current);

                for bucket in completed {
                    let key = RollupKey {
                        granularity,
                        category,
                        bucket_start: bucket,
                    };
                    if self.rollups.contains(&key) {
                        continue;
                    }

                    let range = granularity.bucket_range(bucket);
                    let events = self.store.events_in(category, range);
                    if events.is_empty() {
                        continue;
                    }

                    self.rollups.insert(Rollup {
                        key,
                        summary: summarize(category, &events, range),
                    });
                    report.rollups_created += 1;
                }
            }
        }

        report.raw_evicted = self
            .store
            .evict_before(now.saturating_sub(self.config.raw_retention_millis()));
        report.rollups_evicted = self
            .rollups
            .evict_before(now.saturating_sub(self.config.rollup_retention_millis()));

        debug!(
            rollups_created = report.rollups_created,
            raw_evicted = report.raw_evicted,
            rollups_evicted = report.rollups_evicted,
            "compaction complete"
        );
        report
    }

    /// Spawns the periodic compaction task. It stops when `token` is cancelled.
    pub fn spawn_compaction(&self, token: CancellationToken) -> JoinHandle<()> {
        let collector = self.clone();
        let period = self.config.compaction_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "metrics compaction started");

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        collector.compact(now_millis());
                    }
                }
            }

            info!("metrics compaction stopped");
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
