//! Core types for the ticketing provider client.
//!
//! This module provides:
//! - [`Credential`]: The opaque provider token, redacted and zeroized
//! - [`RateLimitState`]: A quota observation from the provider
//! - [`ApiOperation`] and [`ApiResponse`]: The fixed set of provider calls

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ClientError, Result};

/// Environment variables consulted for the provider token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["TRIAGE_TOKEN", "GITHUB_TOKEN"];

/// The provider credential. Never printed, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    token: String,
}

impl Credential {
    /// Wraps a token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the token is blank.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ClientError::config("credential is empty"));
        }
        Ok(Self { token })
    }

    /// Reads the token from the first non-empty variable in [`TOKEN_ENV_VARS`].
    #[must_use]
    pub fn from_env() -> Option<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| Self::new(value).ok())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A quota observation: `remaining` calls left out of `limit` until `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
}

impl RateLimitState {
    /// Creates a state.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if `remaining > limit`.
    pub fn new(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Result<Self> {
        if remaining > limit {
            return Err(ClientError::validation(
                "rate_limit",
                format!("remaining {remaining} exceeds limit {limit}"),
            ));
        }
        Ok(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Total calls allowed in the window.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Calls left in the window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// When the window resets.
    #[must_use]
    pub const fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Fraction of the quota still available, in `[0, 1]`.
    #[must_use]
    pub fn remaining_fraction(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        f64::from(self.remaining) / f64::from(self.limit)
    }

    /// Fraction of the quota already used, in `[0, 1]`.
    #[must_use]
    pub fn used_fraction(&self) -> f64 {
        1.0 - self.remaining_fraction()
    }

    /// Returns `true` while strictly more than `buffer` of the quota remains.
    ///
    /// With `buffer = 0.2` and `limit = 5000`, 1001 remaining is within the
    /// buffer and 1000 is not.
    #[must_use]
    pub fn is_within_buffer(&self, buffer: f64) -> bool {
        self.remaining_fraction() > buffer
    }

    /// Time until the window resets, rounded up to whole seconds.
    #[must_use]
    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(millis.unsigned_abs().div_ceil(1000))
    }
}

/// A label definition used when syncing the repository taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Label name, e.g. `component:api`.
    pub name: String,
    /// Hex color without the leading `#`.
    pub color: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The fixed set of provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOperation {
    /// Open a new issue.
    CreateIssue {
        /// Issue title.
        title: String,
        /// Issue body.
        body: String,
        /// Labels to apply at creation.
        labels: Vec<String>,
    },
    /// Fetch an issue.
    GetIssue {
        /// Issue number.
        number: u64,
    },
    /// Add labels to an issue.
    AddLabels {
        /// Issue number.
        number: u64,
        /// Labels to add.
        labels: Vec<String>,
    },
    /// Remove one label from an issue.
    RemoveLabel {
        /// Issue number.
        number: u64,
        /// Label to remove.
        label: String,
    },
    /// Comment on an issue.
    CreateComment {
        /// Issue number.
        number: u64,
        /// Comment body.
        body: String,
    },
    /// Ensure the repository has every label in the list.
    SyncLabels {
        /// Desired labels.
        labels: Vec<LabelSpec>,
    },
    /// List open milestones.
    ListMilestones,
    /// Assign an issue to a milestone.
    AssignMilestone {
        /// Issue number.
        number: u64,
        /// Milestone number.
        milestone: u64,
    },
}

impl ApiOperation {
    /// Stable name for logs, errors and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateIssue { .. } => "create_issue",
            Self::GetIssue { .. } => "get_issue",
            Self::AddLabels { .. } => "add_labels",
            Self::RemoveLabel { .. } => "remove_label",
            Self::CreateComment { .. } => "create_comment",
            Self::SyncLabels { .. } => "sync_labels",
            Self::ListMilestones => "list_milestones",
            Self::AssignMilestone { .. } => "assign_milestone",
        }
    }

    /// Checks the operation's arguments before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` naming the operation.
    pub fn validate(&self) -> Result<()> {
        let op = self.name();
        let check_number = |number: u64| {
            if number == 0 {
                Err(ClientError::validation(op, "issue number must be positive"))
            } else {
                Ok(())
            }
        };

        match self {
            Self::CreateIssue { title, .. } if title.trim().is_empty() => {
                Err(ClientError::validation(op, "title is empty"))
            }
            Self::CreateIssue { labels, .. } => check_labels(op, labels),
            Self::GetIssue { number } => check_number(*number),
            Self::AddLabels { number, labels } => {
                check_number(*number)?;
                if labels.is_empty() {
                    return Err(ClientError::validation(op, "no labels given"));
                }
                check_labels(op, labels)
            }
            Self::RemoveLabel { number, label } => {
                check_number(*number)?;
                check_labels(op, std::slice::from_ref(label))
            }
            Self::CreateComment { number, body } => {
                check_number(*number)?;
                if body.trim().is_empty() {
                    return Err(ClientError::validation(op, "comment body is empty"));
                }
                Ok(())
            }
            Self::SyncLabels { labels } => {
                for spec in labels {
                    check_labels(op, std::slice::from_ref(&spec.name))?;
                    if spec.color.len() != 6 || !spec.color.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(ClientError::validation(
                            op,
                            format!("label '{}' has invalid color", spec.name),
                        ));
                    }
                }
                Ok(())
            }
            Self::ListMilestones => Ok(()),
            Self::AssignMilestone { number, milestone } => {
                check_number(*number)?;
                if *milestone == 0 {
                    return Err(ClientError::validation(op, "milestone number must be positive"));
                }
                Ok(())
            }
        }
    }
}

fn check_labels(op: &'static str, labels: &[String]) -> Result<()> {
    if labels.iter().any(|l| l.trim().is_empty()) {
        return Err(ClientError::validation(op, "label name is empty"));
    }
    Ok(())
}

/// An issue as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Body, if any.
    pub body: Option<String>,
    /// Open or closed.
    pub state: String,
    /// Applied label names.
    pub labels: Vec<String>,
}

/// A created comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Provider comment id.
    pub id: u64,
    /// Comment body.
    pub body: String,
}

/// A milestone (grouping) on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Number of open issues assigned.
    pub open_issues: u32,
}

/// Outcome of a label sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSyncReport {
    /// Labels that had to be created.
    pub created: Vec<String>,
    /// Labels that already existed.
    pub existing: Vec<String>,
}

/// Result of a provider operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiResponse {
    /// An issue.
    Issue(Issue),
    /// The labels now applied to an issue.
    Labels {
        /// Label names.
        labels: Vec<String>,
    },
    /// A created comment.
    Comment(Comment),
    /// Label sync outcome.
    LabelSync(LabelSyncReport),
    /// Open milestones.
    Milestones {
        /// The milestones.
        milestones: Vec<Milestone>,
    },
    /// No body.
    Empty,
}
