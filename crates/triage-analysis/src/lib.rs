//! Rule-based content analysis for incoming issues.
#![forbid(unsafe_code)]
//!
//! `triage-analysis` maps an issue's title and body to labels: the affected
//! component, a priority tier and a security flag, with a confidence score.
//! Analysis is pure, synchronous and total: any input, however large or
//! malformed, yields a well-formed [`AnalysisResult`].
//!
//! # Example
//!
//! ```rust
//! use triage_analysis::{Analyzer, Priority};
//!
//! let result = Analyzer::shared().analyze("Login broken", "token leaked in logs");
//! assert!(result.labels().contains("component:auth"));
//! assert!(result.labels().contains("type:security"));
//! assert_eq!(result.priority(), Priority::High);
//! ```

#![doc(html_root_url = "https://docs.rs/triage-analysis/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod analyzer;
pub mod error;
pub mod rules;
pub mod selftest;
pub mod types;

pub use analyzer::{Analyzer, MAX_SCAN_BYTES};
pub use error::{AnalysisError, Result};
pub use rules::{AnalyzerRules, ComponentKeywords, PathRule};
pub use selftest::{run_self_test, SelfTestCase, SelfTestCorpus, SelfTestFailure, SelfTestReport};
pub use types::{AnalysisResult, ComponentSource, Priority, SECURITY_LABEL};
