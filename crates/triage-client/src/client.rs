//! Quota-aware wrapper around a [`TicketingApi`].
//!
//! Every call refreshes the quota first. When fewer than
//! [`ClientConfig::low_water_mark`] calls remain, the calling task sleeps
//! until the window resets plus a fixed buffer. Only the calling task is
//! suspended; other work on the runtime keeps running.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::TicketingApi;
use crate::error::{ClientError, Result};
use crate::types::{ApiOperation, ApiResponse, RateLimitState};

/// Quota handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Share of the quota to keep in reserve, in `[0, 1)`.
    pub buffer_fraction: f64,
    /// Below this many remaining calls, callers wait for the reset.
    pub low_water_mark: u32,
    /// Extra delay added after the reset instant, in milliseconds.
    pub fixed_buffer_ms: u64,
    /// Upper bound on a single quota wait, in seconds.
    pub max_wait_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_fraction: 0.2,
            low_water_mark: 10,
            fixed_buffer_ms: 1000,
            max_wait_secs: 3600,
        }
    }
}

impl ClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` for an out-of-range buffer or a zero wait cap.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.buffer_fraction) {
            return Err(ClientError::config("buffer_fraction must be in [0, 1)"));
        }
        if self.max_wait_secs == 0 {
            return Err(ClientError::config("max_wait_secs must be positive"));
        }
        Ok(())
    }

    /// Returns the fixed buffer as a duration.
    #[must_use]
    pub const fn fixed_buffer(&self) -> Duration {
        Duration::from_millis(self.fixed_buffer_ms)
    }
}

/// Result of a quota endpoint probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaProbe {
    /// The observed quota.
    pub state: RateLimitState,
    /// Round-trip time of the quota request.
    pub latency: Duration,
    /// Whether the quota is still above the configured buffer.
    pub within_buffer: bool,
}

/// Outcome of [`RateLimitedClient::call_timed`].
#[derive(Debug)]
pub struct TimedCall {
    /// The provider's answer or the classified error.
    pub result: Result<ApiResponse>,
    /// Time spent in provider requests, excluding quota and back-off waits.
    pub provider_time: Duration,
}

/// Rate-limited provider client. Clones share the last observed quota.
#[derive(Clone)]
pub struct RateLimitedClient {
    api: Arc<dyn TicketingApi>,
    config: ClientConfig,
    last_state: Arc<RwLock<Option<RateLimitState>>>,
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("config", &self.config)
            .field("last_state", &*self.last_state.read())
            .finish_non_exhaustive()
    }
}

impl RateLimitedClient {
    /// Creates a client over a provider.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid.
    pub fn new(api: Arc<dyn TicketingApi>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api,
            config,
            last_state: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the most recently observed quota, if any.
    #[must_use]
    pub fn last_state(&self) -> Option<RateLimitState> {
        *self.last_state.read()
    }

    async fn refresh(&self) -> Result<RateLimitState> {
        let state = self.api.rate_limit().await?;
        *self.last_state.write() = Some(state);
        debug!(
            limit = state.limit(),
            remaining = state.remaining(),
            reset_at = %state.reset_at(),
            "quota refreshed"
        );
        Ok(state)
    }

    /// How long a call must wait given `state`, or `None` if it may proceed.
    #[must_use]
    pub fn required_wait(&self, state: &RateLimitState, now: DateTime<Utc>) -> Option<Duration> {
        if state.remaining() >= self.config.low_water_mark {
            return None;
        }
        let wait = state.wait_until_reset(now) + self.config.fixed_buffer();
        Some(wait.min(Duration::from_secs(self.config.max_wait_secs)))
    }

    /// Refreshes the quota and reports whether it is above the buffer.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the quota cannot be fetched.
    pub async fn is_within_buffer(&self) -> Result<bool> {
        let state = self.refresh().await?;
        Ok(state.is_within_buffer(self.config.buffer_fraction))
    }

    /// Times a quota request, for health checks.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the quota cannot be fetched.
    pub async fn probe(&self) -> Result<QuotaProbe> {
        let started = Instant::now();
        let state = self.refresh().await?;
        Ok(QuotaProbe {
            state,
            latency: started.elapsed(),
            within_buffer: state.is_within_buffer(self.config.buffer_fraction),
        })
    }

    /// Executes an operation, waiting for the quota reset first if needed.
    ///
    /// # Errors
    ///
    /// Returns the provider's classified error; failures are never retried here.
    pub async fn call(&self, operation: &ApiOperation) -> Result<ApiResponse> {
        self.call_cancellable(operation, &CancellationToken::new()).await
    }

    /// Like [`call`](Self::call), but abandons the operation without issuing
    /// it if `token` is cancelled during the quota wait.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Cancelled` on cancellation, otherwise as [`call`](Self::call).
    pub async fn call_cancellable(
        &self,
        operation: &ApiOperation,
        token: &CancellationToken,
    ) -> Result<ApiResponse> {
        let mut provider_time = Duration::ZERO;
        self.attempt(operation, token, &mut provider_time).await
    }

    /// Like [`call_cancellable`](Self::call_cancellable), retrying exactly once
    /// after the provider's suggested delay when abuse detection trips.
    ///
    /// # Errors
    ///
    /// Returns the second attempt's error, or any non-abuse error unchanged.
    pub async fn call_with_abuse_retry(
        &self,
        operation: &ApiOperation,
        token: &CancellationToken,
    ) -> Result<ApiResponse> {
        self.call_timed(operation, token).await.result
    }

    /// Same as [`call_with_abuse_retry`](Self::call_with_abuse_retry), also
    /// reporting how long the provider itself took to answer.
    ///
    /// Quota waits and the abuse back-off are excluded from
    /// [`TimedCall::provider_time`].
    pub async fn call_timed(
        &self,
        operation: &ApiOperation,
        token: &CancellationToken,
    ) -> TimedCall {
        let mut provider_time = Duration::ZERO;
        let result = match self.attempt(operation, token, &mut provider_time).await {
            Err(ClientError::AbuseDetected { operation: name, retry_after }) => {
                warn!(
                    operation = name,
                    retry_after_secs = retry_after.as_secs(),
                    "abuse detection triggered, retrying once"
                );
                match sleep_or_cancel(retry_after, token, name).await {
                    Ok(()) => self.attempt(operation, token, &mut provider_time).await,
                    Err(e) => Err(e),
                }
            }
            other => other,
        };
        TimedCall {
            result,
            provider_time,
        }
    }

    /// One quota check, optional wait and provider request. Time spent in
    /// provider requests is added to `provider_time`.
    async fn attempt(
        &self,
        operation: &ApiOperation,
        token: &CancellationToken,
        provider_time: &mut Duration,
    ) -> Result<ApiResponse> {
        let name = operation.name();
        operation.validate()?;

        let started = Instant::now();
        let state = self.refresh().await;
        *provider_time += started.elapsed();
        let state = state?;

        if let Some(wait) = self.required_wait(&state, Utc::now()) {
            warn!(
                operation = name,
                remaining = state.remaining(),
                wait_ms = wait.as_millis() as u64,
                "quota nearly exhausted, delaying call"
            );
            sleep_or_cancel(wait, token, name).await?;
        }

        if token.is_cancelled() {
            return Err(ClientError::Cancelled { operation: name });
        }

        let started = Instant::now();
        let result = self.api.execute(operation).await;
        *provider_time += started.elapsed();
        match &result {
            Ok(_) => debug!(operation = name, "provider call succeeded"),
            Err(e) => debug!(operation = name, kind = e.kind(), "provider call failed"),
        }
        result
    }
}

async fn sleep_or_cancel(
    duration: Duration,
    token: &CancellationToken,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        biased;
        () = token.cancelled() => {
            debug!(operation, "wait cancelled");
            Err(ClientError::Cancelled { operation })
        }
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
