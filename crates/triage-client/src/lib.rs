//! Quota-aware ticketing provider client for triage automation.
#![forbid(unsafe_code)]
//!
//! `triage-client` wraps every call to the issue tracker API behind
//! [`RateLimitedClient`], which refreshes the provider quota before each
//! operation and suspends the calling task when the quota is nearly spent.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_client::{
//!     ApiOperation, ClientConfig, Credential, HttpTicketingApi, ProviderConfig, RateLimitedClient,
//! };
//!
//! # async fn example() -> triage_client::Result<()> {
//! let provider = ProviderConfig {
//!     owner: "acme".to_string(),
//!     repo: "widgets".to_string(),
//!     ..Default::default()
//! };
//! let api = HttpTicketingApi::new(provider, Credential::new("token")?)?;
//! let client = RateLimitedClient::new(Arc::new(api), ClientConfig::default())?;
//!
//! client
//!     .call(&ApiOperation::AddLabels { number: 42, labels: vec!["component:api".into()] })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/triage-client/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use api::{ApiFuture, TicketingApi};
pub use client::{ClientConfig, QuotaProbe, RateLimitedClient, TimedCall};
pub use error::{ClientError, Result};
pub use http::{classify_status, ErrorHints, HttpTicketingApi, ProviderConfig};
pub use mock::MockTicketingApi;
pub use types::{
    ApiOperation, ApiResponse, Comment, Credential, Issue, LabelSpec, LabelSyncReport, Milestone,
    RateLimitState, TOKEN_ENV_VARS,
};
