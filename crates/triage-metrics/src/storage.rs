//! Minute-bucketed in-memory event storage.
//!
//! This module provides the [`EventStore`] which keeps raw events partitioned
//! by category and by the minute bucket of their timestamp. Each category has
//! its own lock so writers of different categories never contend.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{Granularity, MetricCategory, MetricEvent, TimeRange};

type Buckets = BTreeMap<i64, Vec<MetricEvent>>;

/// Thread-safe raw event storage.
#[derive(Debug, Default)]
pub struct EventStore {
    /// One bucket map per category, indexed by [`MetricCategory::index`].
    categories: [RwLock<Buckets>; 6],
}

impl EventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, category: MetricCategory) -> &RwLock<Buckets> {
        &self.categories[category.index()]
    }

    /// Appends an event to the minute bucket of its timestamp.
    pub fn insert(&self, event: MetricEvent) {
        let bucket = Granularity::Minute.bucket_start(event.timestamp());
        let mut buckets = self.slot(event.category()).write();
        buckets.entry(bucket).or_default().push(event);
    }

    /// Returns clones of all events of a category within the range.
    #[must_use]
    pub fn events_in(&self, category: MetricCategory, range: TimeRange) -> Vec<MetricEvent> {
        let first = Granularity::Minute.bucket_start(range.start);
        let buckets = self.slot(category).read();
        buckets
            .range(first..=range.end)
            .flat_map(|(_, events)| events.iter())
            .filter(|e| range.contains(e.timestamp()))
            .cloned()
            .collect()
    }

    /// Returns the number of stored events of a category.
    #[must_use]
    pub fn count(&self, category: MetricCategory) -> usize {
        self.slot(category).read().values().map(Vec::len).sum()
    }

    /// Returns the total number of stored events across categories.
    #[must_use]
    pub fn total_count(&self) -> usize {
        MetricCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    /// Returns the number of minute buckets held for a category.
    #[must_use]
    pub fn bucket_count(&self, category: MetricCategory) -> usize {
        self.slot(category).read().len()
    }

    /// Returns the timestamp of the oldest bucket across all categories.
    #[must_use]
    pub fn oldest_bucket(&self) -> Option<i64> {
        MetricCategory::ALL
            .iter()
            .filter_map(|c| self.slot(*c).read().keys().next().copied())
            .min()
    }

    /// Returns the distinct `granularity` buckets that hold events of a
    /// category.
    ///
    /// Derived from the stored minute keys, so the cost follows the amount of
    /// data held rather than the span between timestamps.
    #[must_use]
    pub fn bucket_starts(
        &self,
        category: MetricCategory,
        granularity: Granularity,
    ) -> BTreeSet<i64> {
        self.slot(category)
            .read()
            .keys()
            .map(|minute| granularity.bucket_start(*minute))
            .collect()
    }

    /// Drops every bucket that ends before `cutoff`.
    ///
    /// Returns the number of events removed.
    pub fn evict_before(&self, cutoff: i64) -> usize {
        let keep_from = Granularity::Minute.bucket_start(cutoff);
        let mut removed = 0;

        for category in MetricCategory::ALL {
            let mut buckets = self.slot(category).write();
            let kept = buckets.split_off(&keep_from);
            removed += buckets.values().map(Vec::len).sum::<usize>();
            *buckets = kept;
        }

        if removed > 0 {
            debug!(removed, cutoff, "evicted raw metric events");
        }
        removed
    }

    /// Clears all events.
    pub fn clear(&self) {
        for category in MetricCategory::ALL {
            self.slot(category).write().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngagementEvent, EngagementKind, ErrorEvent, EventData};

    fn engagement(ts: i64) -> MetricEvent {
        MetricEvent::new(
            ts,
            EventData::Engagement(EngagementEvent {
                kind: EngagementKind::Comment,
                issue_number: Some(1),
            }),
        )
        .unwrap()
    }

    fn error(ts: i64) -> MetricEvent {
        MetricEvent::new(
            ts,
            EventData::Error(ErrorEvent {
                component: "api".to_string(),
                kind: "network".to_string(),
                message: "connection reset".to_string(),
            }),
        )
        .unwrap()
    }

    mod insert_tests {
        use super::*;

        #[test]
        fn insert_groups_by_minute() {
            let store = EventStore::new();
            store.insert(engagement(60_000));
            store.insert(engagement(60_500));
            store.insert(engagement(120_000));

            assert_eq!(store.count(MetricCategory::Engagement), 3);
            assert_eq!(store.bucket_count(MetricCategory::Engagement), 2);
        }

        #[test]
        fn categories_are_partitioned() {
            let store = EventStore::new();
            store.insert(engagement(0));
            store.insert(error(0));

            assert_eq!(store.count(MetricCategory::Engagement), 1);
            assert_eq!(store.count(MetricCategory::Error), 1);
            assert_eq!(store.count(MetricCategory::ApiUsage), 0);
            assert_eq!(store.total_count(), 2);
        }
    }

    mod range_tests {
        use super::*;

        #[test]
        fn events_in_filters_within_bucket() {
            let store = EventStore::new();
            store.insert(engagement(60_000));
            store.insert(engagement(60_010));
            store.insert(engagement(60_020));

            let range = TimeRange::new(60_005, 60_015).unwrap();
            let events = store.events_in(MetricCategory::Engagement, range);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].timestamp(), 60_010);
        }

        #[test]
        fn events_in_spans_buckets() {
            let store = EventStore::new();
            for minute in 0..10 {
                store.insert(engagement(minute * 60_000 + 1));
            }

            let range = TimeRange::new(120_000, 299_999).unwrap();
            assert_eq!(store.events_in(MetricCategory::Engagement, range).len(), 3);
        }

        #[test]
        fn disjoint_range_is_empty() {
            let store = EventStore::new();
            store.insert(engagement(1_000));

            let range = TimeRange::new(500_000, 600_000).unwrap();
            assert!(store.events_in(MetricCategory::Engagement, range).is_empty());
        }

        #[test]
        fn bucket_starts_follow_stored_data_not_span() {
            let store = EventStore::new();
            let hour = 3_600_000;
            store.insert(engagement(hour + 5));
            store.insert(engagement(hour + 120_000));
            store.insert(engagement(400 * 86_400_000));

            let hours = store.bucket_starts(MetricCategory::Engagement, Granularity::Hour);
            assert_eq!(hours.into_iter().collect::<Vec<_>>(), vec![hour, 400 * 86_400_000]);

            let days = store.bucket_starts(MetricCategory::Engagement, Granularity::Day);
            assert_eq!(days.len(), 2);
            assert!(store.bucket_starts(MetricCategory::Error, Granularity::Day).is_empty());
        }
    }

    mod eviction_tests {
        use super::*;

        #[test]
        fn evict_before_removes_old_buckets() {
            let store = EventStore::new();
            store.insert(engagement(0));
            store.insert(error(30_000));
            store.insert(engagement(180_000));

            let removed = store.evict_before(120_000);
            assert_eq!(removed, 2);
            assert_eq!(store.total_count(), 1);
            assert_eq!(store.oldest_bucket(), Some(180_000));
        }

        #[test]
        fn evict_on_empty_store() {
            let store = EventStore::new();
            assert_eq!(store.evict_before(1_000_000), 0);
            assert_eq!(store.oldest_bucket(), None);
        }

        #[test]
        fn clear_removes_everything() {
            let store = EventStore::new();
            store.insert(engagement(0));
            store.insert(error(0));
            store.clear();
            assert_eq!(store.total_count(), 0);
        }
    }
}
