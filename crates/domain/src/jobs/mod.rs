//! Jobs: build references, per-job feedback policy and trigger causes

pub mod causes;
pub mod policy;

pub use causes::*;
pub use policy::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::JobName;

/// One build of a job, or a placeholder for a build that has not started
///
/// Equality is structural. Use [`BuildRef::matches`] to let a placeholder
/// stand for whichever build its job eventually gets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRef {
    pub job: JobName,
    #[serde(default)]
    pub number: Option<u64>,
}

impl BuildRef {
    pub fn new(job: impl Into<JobName>, number: u64) -> Self {
        Self {
            job: job.into(),
            number: Some(number),
        }
    }

    /// Placeholder for a triggered but not yet started build
    pub fn pending(job: impl Into<JobName>) -> Self {
        Self {
            job: job.into(),
            number: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.number.is_none()
    }

    /// Same job, and the same number when both are known.
    ///
    /// Not transitive: a placeholder matches every build of its job.
    pub fn matches(&self, other: &BuildRef) -> bool {
        if self.job != other.job {
            return false;
        }
        match (self.number, other.number) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(number) => write!(f, "{}#{}", self.job, number),
            None => write!(f, "{}#?", self.job),
        }
    }
}
