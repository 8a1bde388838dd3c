//! Health monitoring for triage automation.
#![forbid(unsafe_code)]
//!
//! `triage-health` runs independent probes against the provider API, the
//! analysis engine, host memory and the recorded error rate. Probes run
//! concurrently under a shared per-probe timeout; the aggregator reduces
//! their results to one [`HealthSnapshot`] and keeps a bounded history for
//! trend queries.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_health::{HealthAggregator, HealthConfig, ResourceProbe, SysinfoMemory};
//!
//! # async fn example() -> triage_health::Result<()> {
//! let config = HealthConfig::default();
//! let aggregator = HealthAggregator::new(config.clone())?.with_probe(Arc::new(ResourceProbe::new(
//!     Arc::new(SysinfoMemory::new()),
//!     config.memory_degraded_percent,
//!     config.memory_unhealthy_percent,
//! )))?;
//!
//! let snapshot = aggregator.run_cycle().await;
//! println!("overall: {}", snapshot.overall);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/triage-health/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregator;
pub mod error;
pub mod probe;
pub mod types;

pub use aggregator::{HealthAggregator, HealthConfig, TrendPoint};
pub use error::{HealthError, Result};
pub use probe::{
    AnalysisProbe, ApiProbe, ErrorRateProbe, HealthProbe, MemorySample, MemorySource, ProbeFuture,
    ResourceProbe, SysinfoMemory,
};
pub use types::{ComponentHealth, HealthSnapshot, HealthStatus};
