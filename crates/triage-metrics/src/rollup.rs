//! Hourly and daily rollups.
//!
//! Rollups are summaries of completed hour or day buckets, computed by
//! re-querying raw events. They outlive the raw events they were built from.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::query::AggregateSummary;
use crate::types::{Granularity, MetricCategory, TimeRange};

/// Identifies one rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RollupKey {
    /// Rollup width.
    pub granularity: Granularity,
    /// Summarized category.
    pub category: MetricCategory,
    /// Start of the bucket, in milliseconds.
    pub bucket_start: i64,
}

/// A summary of one completed bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    /// The rollup identity.
    pub key: RollupKey,
    /// The summary of the bucket.
    pub summary: AggregateSummary,
}

impl Rollup {
    /// Returns the range covered by this rollup.
    #[must_use]
    pub const fn range(&self) -> TimeRange {
        self.key.granularity.bucket_range(self.key.bucket_start)
    }
}

/// Thread-safe rollup storage.
#[derive(Debug, Default)]
pub struct RollupStore {
    rollups: RwLock<BTreeMap<RollupKey, Rollup>>,
}

impl RollupStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a rollup exists for the key.
    #[must_use]
    pub fn contains(&self, key: &RollupKey) -> bool {
        self.rollups.read().contains_key(key)
    }

    /// Inserts or replaces a rollup.
    pub fn insert(&self, rollup: Rollup) {
        self.rollups.write().insert(rollup.key, rollup);
    }

    /// Returns rollups of a category and granularity whose bucket overlaps `range`,
    /// ordered by bucket start.
    #[must_use]
    pub fn query(
        &self,
        category: MetricCategory,
        granularity: Granularity,
        range: TimeRange,
    ) -> Vec<Rollup> {
        let rollups = self.rollups.read();
        rollups
            .values()
            .filter(|r| r.key.category == category && r.key.granularity == granularity)
            .filter(|r| r.range().overlaps(&range))
            .cloned()
            .collect()
    }

    /// Returns the number of stored rollups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rollups.read().len()
    }

    /// Returns true if no rollups are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops rollups whose bucket ends before `cutoff`.
    ///
    /// Returns the number removed.
    pub fn evict_before(&self, cutoff: i64) -> usize {
        let mut rollups = self.rollups.write();
        let before = rollups.len();
        rollups.retain(|_, r| r.range().end >= cutoff);
        before - rollups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ErrorSummary;

    fn rollup(granularity: Granularity, bucket_start: i64) -> Rollup {
        Rollup {
            key: RollupKey {
                granularity,
                category: MetricCategory::Error,
                bucket_start,
            },
            summary: AggregateSummary::Error(ErrorSummary {
                count: 1,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn insert_and_query_by_granularity() {
        let store = RollupStore::new();
        store.insert(rollup(Granularity::Hour, 0));
        store.insert(rollup(Granularity::Hour, 3_600_000));
        store.insert(rollup(Granularity::Day, 0));

        let range = TimeRange::new(0, 86_399_999).unwrap();
        assert_eq!(store.query(MetricCategory::Error, Granularity::Hour, range).len(), 2);
        assert_eq!(store.query(MetricCategory::Error, Granularity::Day, range).len(), 1);
        assert!(store
            .query(MetricCategory::ApiUsage, Granularity::Hour, range)
            .is_empty());
    }

    #[test]
    fn insert_replaces_same_key() {
        let store = RollupStore::new();
        store.insert(rollup(Granularity::Hour, 0));
        store.insert(rollup(Granularity::Hour, 0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evict_before_uses_bucket_end() {
        let store = RollupStore::new();
        store.insert(rollup(Granularity::Hour, 0));
        store.insert(rollup(Granularity::Hour, 3_600_000));

        // The first bucket ends at 3_599_999.
        assert_eq!(store.evict_before(3_600_000), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&RollupKey {
            granularity: Granularity::Hour,
            category: MetricCategory::Error,
            bucket_start: 3_600_000,
        }));
    }
}
