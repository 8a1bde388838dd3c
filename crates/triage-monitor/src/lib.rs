//! Issue triage monitoring service.
//!
//! `triage-monitor` wires the triage components into one running service:
//!
//! - **Configuration**: a single JSON document with a section per component
//! - **Pipeline**: analyzes incoming issues and applies labels through the
//!   rate-limited client, recording labeling, API and engagement metrics
//! - **Background work**: metrics compaction, periodic health cycles whose
//!   snapshots feed the alerting engine, metrics-driven alerting and the
//!   hourly alert maintenance
//!
//! The `triage-monitor` binary exposes the service and a few one-shot
//! commands (`analyze`, `self-test`, `quota`, `init-config`).

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/triage-monitor/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

pub use config::{ChannelConfig, MonitorConfig};
pub use error::{MonitorError, Result};
pub use pipeline::{IssueEvent, IssueEventKind, TriageOutcome, TriagePipeline};
pub use service::{Monitor, MonitorBuilder, StatusReport};
