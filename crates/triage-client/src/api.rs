//! Provider API trait definition.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{ApiOperation, ApiResponse, RateLimitState};

/// Boxed future returned by [`TicketingApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A ticketing provider.
///
/// This trait abstracts over the concrete transport so the quota logic in
/// [`RateLimitedClient`](crate::RateLimitedClient) can be exercised against an
/// in-memory provider.
pub trait TicketingApi: Send + Sync {
    /// Fetches the current quota state.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota endpoint cannot be reached or parsed.
    fn rate_limit(&self) -> ApiFuture<'_, RateLimitState>;

    /// Executes one operation.
    ///
    /// # Errors
    ///
    /// Returns a `ClientError` classified by the provider's response.
    fn execute<'a>(&'a self, operation: &'a ApiOperation) -> ApiFuture<'a, ApiResponse>;
}
