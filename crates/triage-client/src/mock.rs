//! In-memory provider for tests and dry runs.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;

use crate::api::{ApiFuture, TicketingApi};
use crate::error::Result;
use crate::types::{ApiOperation, ApiResponse, Issue, LabelSyncReport, RateLimitState};

#[derive(Debug)]
struct MockState {
    rate_limits: VecDeque<Result<RateLimitState>>,
    fallback_limit: u32,
    responses: VecDeque<Result<ApiResponse>>,
    executed: Vec<ApiOperation>,
    rate_limit_calls: usize,
    latency: Duration,
}

/// A scripted provider.
///
/// Quota observations and responses are served from queues; once a queue is
/// empty a full quota and a synthesized success are returned. Every executed
/// operation is recorded.
#[derive(Debug)]
pub struct MockTicketingApi {
    state: Mutex<MockState>,
}

impl MockTicketingApi {
    /// Creates a provider reporting a full quota of 5000 calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                rate_limits: VecDeque::new(),
                fallback_limit: 5000,
                responses: VecDeque::new(),
                executed: Vec::new(),
                rate_limit_calls: 0,
                latency: Duration::ZERO,
            }),
        }
    }

    /// Delays every quota lookup by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Queues a quota observation.
    pub fn push_rate_limit(&self, state: Result<RateLimitState>) {
        self.state.lock().rate_limits.push_back(state);
    }

    /// Queues a response for the next executed operation.
    pub fn push_response(&self, response: Result<ApiResponse>) {
        self.state.lock().responses.push_back(response);
    }

    /// Returns the operations executed so far.
    #[must_use]
    pub fn executed(&self) -> Vec<ApiOperation> {
        self.state.lock().executed.clone()
    }

    /// Returns how many times the quota was queried.
    #[must_use]
    pub fn rate_limit_calls(&self) -> usize {
        self.state.lock().rate_limit_calls
    }

    fn synthesize(operation: &ApiOperation) -> ApiResponse {
        match operation {
            ApiOperation::CreateIssue { title, body, labels } => ApiResponse::Issue(Issue {
                number: 1,
                title: title.clone(),
                body: Some(body.clone()),
                state: "open".to_string(),
                labels: labels.clone(),
            }),
            ApiOperation::GetIssue { number } => ApiResponse::Issue(Issue {
                number: *number,
                title: String::new(),
                body: None,
                state: "open".to_string(),
                labels: Vec::new(),
            }),
            ApiOperation::AddLabels { labels, .. } => ApiResponse::Labels {
                labels: labels.clone(),
            },
            ApiOperation::RemoveLabel { .. } => ApiResponse::Labels { labels: Vec::new() },
            ApiOperation::SyncLabels { labels } => ApiResponse::LabelSync(LabelSyncReport {
                created: labels.iter().map(|l| l.name.clone()).collect(),
                existing: Vec::new(),
            }),
            ApiOperation::ListMilestones => ApiResponse::Milestones {
                milestones: Vec::new(),
            },
            ApiOperation::CreateComment { .. } | ApiOperation::AssignMilestone { .. } => {
                ApiResponse::Empty
            }
        }
    }
}

impl Default for MockTicketingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketingApi for MockTicketingApi {
    fn rate_limit(&self) -> ApiFuture<'_, RateLimitState> {
        Box::pin(async move {
            let (scripted, latency, limit) = {
                let mut state = self.state.lock();
                state.rate_limit_calls += 1;
                (state.rate_limits.pop_front(), state.latency, state.fallback_limit)
            };

            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            match scripted {
                Some(result) => result,
                None => RateLimitState::new(limit, limit, Utc::now() + TimeDelta::hours(1)),
            }
        })
    }

    fn execute<'a>(&'a self, operation: &'a ApiOperation) -> ApiFuture<'a, ApiResponse> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.executed.push(operation.clone());
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| Ok(Self::synthesize(operation)))
        })
    }
}
