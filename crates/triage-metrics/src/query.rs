//! Category-specific aggregate summaries.
//!
//! Every statistic is an `Option`: a range without data yields `None` rather
//! than zero so missing data never reads as a good metric.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{EventData, MetricCategory, MetricEvent, TimeRange};

/// Summary of automatic labeling outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelingSummary {
    /// Number of labeling passes.
    pub count: u64,
    /// Mean analyzer confidence.
    pub average_confidence: Option<f64>,
    /// Share of passes confirmed correct, among those with known correctness.
    pub accuracy: Option<f64>,
    /// Mean analysis time in milliseconds.
    pub average_processing_ms: Option<f64>,
    /// Total labels applied.
    pub labels_applied: u64,
}

/// Summary of provider API usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageSummary {
    /// Number of calls.
    pub count: u64,
    /// Share of successful calls.
    pub success_rate: Option<f64>,
    /// Share of failed calls.
    pub error_rate: Option<f64>,
    /// Mean response time in milliseconds.
    pub average_response_ms: Option<f64>,
    /// 95th percentile response time in milliseconds.
    pub p95_response_ms: Option<f64>,
    /// Lowest remaining quota observed.
    pub min_rate_limit_remaining: Option<u32>,
    /// Calls per minute over the queried range.
    pub calls_per_minute: Option<f64>,
    /// Call counts by status code.
    pub by_status: BTreeMap<u16, u64>,
}

/// Summary of timed operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Number of samples.
    pub count: u64,
    /// Mean duration in milliseconds.
    pub average_duration_ms: Option<f64>,
    /// 95th percentile duration in milliseconds.
    pub p95_duration_ms: Option<f64>,
    /// Operations per minute over the queried range.
    pub throughput_per_minute: Option<f64>,
    /// 95th percentile resident memory in bytes.
    pub memory_p95_bytes: Option<f64>,
}

/// Summary of recorded failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Number of errors.
    pub count: u64,
    /// Errors per minute over the queried range.
    pub errors_per_minute: Option<f64>,
    /// Error counts by component.
    pub by_component: BTreeMap<String, u64>,
    /// Error counts by kind.
    pub by_kind: BTreeMap<String, u64>,
}

/// Summary of tracker activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    /// Number of activity events.
    pub count: u64,
    /// Events per minute over the queried range.
    pub events_per_minute: Option<f64>,
    /// Counts by kind name.
    pub by_kind: BTreeMap<String, u64>,
}

/// Summary of process resource samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    /// Number of samples.
    pub count: u64,
    /// Memory percentage of the most recent sample.
    pub latest_memory_percent: Option<f64>,
    /// 95th percentile memory percentage.
    pub memory_p95_percent: Option<f64>,
    /// Largest uptime reported, in seconds.
    pub uptime_secs: Option<u64>,
}

/// Aggregate over one category and time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum AggregateSummary {
    /// See [`LabelingSummary`].
    AutoLabeling(LabelingSummary),
    /// See [`ApiUsageSummary`].
    ApiUsage(ApiUsageSummary),
    /// See [`PerformanceSummary`].
    Performance(PerformanceSummary),
    /// See [`ErrorSummary`].
    Error(ErrorSummary),
    /// See [`EngagementSummary`].
    Engagement(EngagementSummary),
    /// See [`SystemSummary`].
    System(SystemSummary),
}

impl AggregateSummary {
    /// Returns the number of events summarized.
    #[must_use]
    pub const fn count(&self) -> u64 {
        match self {
            Self::AutoLabeling(s) => s.count,
            Self::ApiUsage(s) => s.count,
            Self::Performance(s) => s.count,
            Self::Error(s) => s.count,
            Self::Engagement(s) => s.count,
            Self::System(s) => s.count,
        }
    }

    /// Returns true if the summary covers no events.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns the category of this summary.
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
}

/// Returns the arithmetic mean, or `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Returns the nearest-rank percentile (`p` in `[0, 100]`), or `None` for an empty slice.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.saturating_sub(1)).copied()
}

fn per_minute(count: u64, range: TimeRange) -> Option<f64> {
    (count > 0).then(|| count as f64 / range.duration_minutes())
}

fn ratio(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

/// Summarizes events of `category` that fall inside `range`.
///
/// Events of other categories are ignored.
#[must_use]
pub fn summarize(category: MetricCategory, events: &[MetricEvent], range: TimeRange) -> AggregateSummary {
    let data = events
        .iter()
        .filter(|e| range.contains(e.timestamp()))
        .map(MetricEvent::data);

    match category {
        MetricCategory::AutoLabeling => {
            let items: Vec<_> = data
                .filter_map(|d| match d {
                    EventData::AutoLabeling(e) => Some(e),
                    _ => None,
                })
                .collect();
            let confidences: Vec<f64> = items.iter().map(|e| e.confidence).collect();
            let timings: Vec<f64> = items.iter().map(|e| e.processing_ms).collect();
            let judged = items.iter().filter(|e| e.correct.is_some()).count() as u64;
            let correct = items.iter().filter(|e| e.correct == Some(true)).count() as u64;

            AggregateSummary::AutoLabeling(LabelingSummary {
                count: items.len() as u64,
                average_confidence: mean(&confidences),
                accuracy: ratio(correct, judged),
                average_processing_ms: mean(&timings),
                labels_applied: items.iter().map(|e| e.labels.len() as u64).sum(),
            })
        }
        MetricCategory::ApiUsage => {
            let items: Vec<_> = data
                .filter_map(|d| match d {
                    EventData::ApiUsage(e) => Some(e),
                    _ => None,
                })
                .collect();
            let count = items.len() as u64;
            let successes = items.iter().filter(|e| e.is_success()).count() as u64;
            let timings: Vec<f64> = items.iter().map(|e| e.response_time_ms).collect();
            let mut by_status = BTreeMap::new();
            for item in &items {
                *by_status.entry(item.status_code).or_insert(0) += 1;
            }

            AggregateSummary::ApiUsage(ApiUsageSummary {
                count,
                success_rate: ratio(successes, count),
                error_rate: ratio(count - successes, count),
                average_response_ms: mean(&timings),
                p95_response_ms: percentile(&timings, 95.0),
                min_rate_limit_remaining: items.iter().filter_map(|e| e.rate_limit_remaining).min(),
                calls_per_minute: per_minute(count, range),
                by_status,
            })
        }
        MetricCategory::Performance => {
            let items: Vec<_> = data
                .filter_map(|d| match d {
                    EventData::Performance(e) => Some(e),
                    _ => None,
                })
                .collect();
            let count = items.len() as u64;
            let durations: Vec<f64> = items.iter().map(|e| e.duration_ms).collect();
            let memory: Vec<f64> = items
                .iter()
                .filter_map(|e| e.memory_bytes.map(|b| b as f64))
                .collect();

            AggregateSummary::Performance(PerformanceSummary {
                count,
                average_duration_ms: mean(&durations),
                p95_duration_ms: percentile(&durations, 95.0),
                throughput_per_minute: per_minute(count, range),
                memory_p95_bytes: percentile(&memory, 95.0),
            })
        }
        MetricCategory::Error => {
            let mut summary = ErrorSummary::default();
            for item in data {
                if let EventData::Error(e) = item {
                    summary.count += 1;
                    *summary.by_component.entry(e.component.clone()).or_insert(0) += 1;
                    *summary.by_kind.entry(e.kind.clone()).or_insert(0) += 1;
                }
            }
            summary.errors_per_minute = per_minute(summary.count, range);
            AggregateSummary::Error(summary)
        }
        MetricCategory::Engagement => {
            let mut summary = EngagementSummary::default();
            for item in data {
                if let EventData::Engagement(e) = item {
                    summary.count += 1;
                    *summary.by_kind.entry(e.kind.as_str().to_string()).or_insert(0) += 1;
                }
            }
            summary.events_per_minute = per_minute(summary.count, range);
            AggregateSummary::Engagement(summary)
        }
        MetricCategory::System => {
            let mut samples: Vec<(i64, &crate::types::SystemEvent)> = events
                .iter()
                .filter(|e| range.contains(e.timestamp()))
                .filter_map(|e| match e.data() {
                    EventData::System(s) => Some((e.timestamp(), s)),
                    _ => None,
                })
                .collect();
            samples.sort_by_key(|(ts, _)| *ts);
            let percents: Vec<f64> = samples.iter().filter_map(|(_, s)| s.memory_percent()).collect();

            AggregateSummary::System(SystemSummary {
                count: samples.len() as u64,
                latest_memory_percent: samples.last().and_then(|(_, s)| s.memory_percent()),
                memory_p95_percent: percentile(&percents, 95.0),
                uptime_secs: samples.iter().map(|(_, s)| s.uptime_secs).max(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiUsageEvent, AutoLabelingEvent, ErrorEvent, SystemEvent};
    use test_case::test_case;

    fn range() -> TimeRange {
        TimeRange::new(0, 600_000).unwrap()
    }

    fn api(ts: i64, status_code: u16, ms: f64, remaining: u32) -> MetricEvent {
        MetricEvent::new(
            ts,
            EventData::ApiUsage(ApiUsageEvent {
                endpoint: "get_issue".to_string(),
                status_code,
                response_time_ms: ms,
                rate_limit_remaining: Some(remaining),
            }),
        )
        .unwrap()
    }

    fn labeling(ts: i64, confidence: f64, correct: Option<bool>) -> MetricEvent {
        MetricEvent::new(
            ts,
            EventData::AutoLabeling(AutoLabelingEvent {
                issue_number: 1,
                labels: vec!["component:docs".to_string()],
                confidence,
                correct,
                processing_ms: 2.0,
            }),
        )
        .unwrap()
    }

    mod helper_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn mean_of_empty_is_none() {
            assert_eq!(mean(&[]), None);
        }

        #[test]
        fn mean_of_values() {
            assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        }

        #[test_case(50.0, 5.0 ; "median")]
        #[test_case(95.0, 10.0 ; "p95")]
        #[test_case(0.0, 1.0 ; "p0 is minimum")]
        #[test_case(100.0, 10.0 ; "p100 is maximum")]
        fn percentile_nearest_rank(p: f64, expected: f64) {
            let values: Vec<f64> = (1..=10).rev().map(f64::from).collect();
            assert_eq!(percentile(&values, p), Some(expected));
        }

        #[test]
        fn percentile_of_empty_is_none() {
            assert_eq!(percentile(&[], 95.0), None);
        }
    }

    mod empty_range_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(MetricCategory::AutoLabeling ; "labeling")]
        #[test_case(MetricCategory::ApiUsage ; "api")]
        #[test_case(MetricCategory::Performance ; "performance")]
        #[test_case(MetricCategory::Error ; "error")]
        #[test_case(MetricCategory::Engagement ; "engagement")]
        #[test_case(MetricCategory::System ; "system")]
        fn empty_summary_has_zero_count(category: MetricCategory) {
            let summary = summarize(category, &[], range());
            assert!(summary.is_empty());
            assert_eq!(summary.category(), category);
        }

        #[test]
        fn empty_api_summary_reports_no_data() {
            let AggregateSummary::ApiUsage(summary) = summarize(MetricCategory::ApiUsage, &[], range())
            else {
                panic!("expected api summary");
            };
            assert_eq!(summary.success_rate, None);
            assert_eq!(summary.error_rate, None);
            assert_eq!(summary.average_response_ms, None);
            assert_eq!(summary.calls_per_minute, None);
        }
    }

    mod api_summary_tests {
        use super::*;

        #[test]
        fn success_and_error_rates() {
            let events = vec![
                api(1_000, 200, 100.0, 4000),
                api(2_000, 201, 300.0, 3999),
                api(3_000, 500, 200.0, 3998),
                api(4_000, 403, 400.0, 3997),
            ];
            let AggregateSummary::ApiUsage(summary) =
                summarize(MetricCategory::ApiUsage, &events, range())
            else {
                panic!("expected api summary");
            };

            assert_eq!(summary.count, 4);
            assert_eq!(summary.success_rate, Some(0.5));
            assert_eq!(summary.error_rate, Some(0.5));
            assert_eq!(summary.average_response_ms, Some(250.0));
            assert_eq!(summary.p95_response_ms, Some(400.0));
            assert_eq!(summary.min_rate_limit_remaining, Some(3997));
            assert_eq!(summary.by_status.get(&500), Some(&1));
            // 4 calls over 10 minutes.
            assert_eq!(summary.calls_per_minute, Some(0.4));
        }

        #[test]
        fn events_outside_range_are_ignored() {
            let events = vec![api(1_000, 200, 100.0, 10), api(700_000, 500, 100.0, 1)];
            let summary = summarize(MetricCategory::ApiUsage, &events, range());
            assert_eq!(summary.count(), 1);
        }
    }

    mod labeling_summary_tests {
        use super::*;

        #[test]
        fn accuracy_uses_only_judged_events() {
            let events = vec![
                labeling(1, 0.7, Some(true)),
                labeling(2, 0.4, Some(false)),
                labeling(3, 1.0, None),
            ];
            let AggregateSummary::AutoLabeling(summary) =
                summarize(MetricCategory::AutoLabeling, &events, range())
            else {
                panic!("expected labeling summary");
            };

            assert_eq!(summary.count, 3);
            assert_eq!(summary.accuracy, Some(0.5));
            assert_eq!(summary.labels_applied, 3);
            assert!((summary.average_confidence.unwrap() - 0.7).abs() < 1e-9);
        }

        #[test]
        fn accuracy_unknown_without_judgements() {
            let events = vec![labeling(1, 0.9, None)];
            let AggregateSummary::AutoLabeling(summary) =
                summarize(MetricCategory::AutoLabeling, &events, range())
            else {
                panic!("expected labeling summary");
            };
            assert_eq!(summary.accuracy, None);
        }
    }

    mod other_summary_tests {
        use super::*;

        #[test]
        fn error_summary_groups() {
            let make = |component: &str, kind: &str| {
                MetricEvent::new(
                    5,
                    EventData::Error(ErrorEvent {
                        component: component.to_string(),
                        kind: kind.to_string(),
                        message: "failed".to_string(),
                    }),
                )
                .unwrap()
            };
            let events = vec![make("api", "network"), make("api", "auth"), make("health", "timeout")];
            let AggregateSummary::Error(summary) = summarize(MetricCategory::Error, &events, range())
            else {
                panic!("expected error summary");
            };

            assert_eq!(summary.count, 3);
            assert_eq!(summary.by_component.get("api"), Some(&2));
            assert_eq!(summary.by_kind.get("timeout"), Some(&1));
            assert_eq!(summary.errors_per_minute, Some(0.3));
        }

        #[test]
        fn system_summary_latest_is_by_timestamp() {
            let sample = |ts: i64, used: u64| {
                MetricEvent::new(
                    ts,
                    EventData::System(SystemEvent {
                        memory_used_bytes: used,
                        memory_total_bytes: 100,
                        uptime_secs: ts as u64,
                    }),
                )
                .unwrap()
            };
            let events = vec![sample(30, 40), sample(10, 90), sample(20, 10)];
            let AggregateSummary::System(summary) = summarize(MetricCategory::System, &events, range())
            else {
                panic!("expected system summary");
            };

            assert_eq!(summary.latest_memory_percent, Some(40.0));
            assert_eq!(summary.memory_p95_percent, Some(90.0));
            assert_eq!(summary.uptime_secs, Some(30));
        }
    }
}
