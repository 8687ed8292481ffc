use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SharedError;

/// Terminal result of one build run
///
/// Declaration order follows severity: a later variant is worse than an
/// earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildResult {
    pub fn ordinal(&self) -> u8 {
        match self {
            BuildResult::Success => 0,
            BuildResult::Unstable => 1,
            BuildResult::Failure => 2,
            BuildResult::NotBuilt => 3,
            BuildResult::Aborted => 4,
        }
    }

    pub fn is_worse_than(&self, other: BuildResult) -> bool {
        self.ordinal() > other.ordinal()
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildResult::Success => write!(f, "SUCCESS"),
            BuildResult::Unstable => write!(f, "UNSTABLE"),
            BuildResult::Failure => write!(f, "FAILURE"),
            BuildResult::NotBuilt => write!(f, "NOT_BUILT"),
            BuildResult::Aborted => write!(f, "ABORTED"),
        }
    }
}

impl FromStr for BuildResult {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(BuildResult::Success),
            "UNSTABLE" => Ok(BuildResult::Unstable),
            "FAILURE" => Ok(BuildResult::Failure),
            "NOT_BUILT" => Ok(BuildResult::NotBuilt),
            "ABORTED" => Ok(BuildResult::Aborted),
            _ => Err(SharedError::InvalidBuildResult(s.to_string())),
        }
    }
}

/// Who the review server should notify about a posted review.
///
/// Ordered from least to most verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyLevel {
    None,
    Owner,
    OwnerReviewers,
    #[default]
    All,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyLevel::None => write!(f, "NONE"),
            NotifyLevel::Owner => write!(f, "OWNER"),
            NotifyLevel::OwnerReviewers => write!(f, "OWNER_REVIEWERS"),
            NotifyLevel::All => write!(f, "ALL"),
        }
    }
}

impl FromStr for NotifyLevel {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(NotifyLevel::None),
            "OWNER" => Ok(NotifyLevel::Owner),
            "OWNER_REVIEWERS" => Ok(NotifyLevel::OwnerReviewers),
            "ALL" => Ok(NotifyLevel::All),
            _ => Err(SharedError::InvalidNotifyLevel(s.to_string())),
        }
    }
}

/// Aggregated outcome of every build an event triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Successful,
    Failed,
    Unstable,
    NotBuilt,
    Aborted,
}

impl Verdict {
    /// Category a single build result is scored under
    pub fn of(result: BuildResult) -> Self {
        match result {
            BuildResult::Success => Verdict::Successful,
            BuildResult::Failure => Verdict::Failed,
            BuildResult::Unstable => Verdict::Unstable,
            BuildResult::NotBuilt => Verdict::NotBuilt,
            BuildResult::Aborted => Verdict::Aborted,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Successful => write!(f, "SUCCESSFUL"),
            Verdict::Failed => write!(f, "FAILED"),
            Verdict::Unstable => write!(f, "UNSTABLE"),
            Verdict::NotBuilt => write!(f, "NOT_BUILT"),
            Verdict::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// The two independent score labels sent back to the review server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAxis {
    Verified,
    CodeReview,
}

impl ScoreAxis {
    /// Command-line flag the score is passed with
    pub fn flag(&self) -> &'static str {
        match self {
            ScoreAxis::Verified => "--verified",
            ScoreAxis::CodeReview => "--code-review",
        }
    }
}

impl fmt::Display for ScoreAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreAxis::Verified => write!(f, "VERIFIED"),
            ScoreAxis::CodeReview => write!(f, "CODE_REVIEW"),
        }
    }
}

/// Lifecycle state of one job's participation in one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    /// Scheduled, no build number yet
    Triggered,
    /// Running with a known build number
    Building,
    /// Finished with a result
    Completed(BuildResult),
    /// Removed from the scheduler queue before it started
    Cancelled,
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Completed(_) | EntryState::Cancelled)
    }

    pub fn result(&self) -> Option<BuildResult> {
        match self {
            EntryState::Completed(result) => Some(*result),
            _ => None,
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Triggered => write!(f, "TRIGGERED"),
            EntryState::Building => write!(f, "BUILDING"),
            EntryState::Completed(result) => write!(f, "COMPLETED({})", result),
            EntryState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
