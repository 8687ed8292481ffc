//! Read-only views over the correlation store

use serde::{Deserialize, Serialize};
use tally_shared::{EventKey, JobName};

use super::imprint::Entry;
use crate::events::ReviewEvent;
use crate::jobs::BuildRef;

/// Diagnostic copy of every imprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryReport {
    pub events: Vec<ImprintReport>,
}

impl MemoryReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprintReport {
    pub key: EventKey,
    pub event: ReviewEvent,
    pub entries: Vec<Entry>,
}

/// A build and its siblings under the same event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub this_build: BuildRef,
    /// Sibling builds that have started
    pub other_builds: Vec<BuildRef>,
    /// Sibling jobs still waiting for a build
    pub other_projects: Vec<JobName>,
}

impl TriggerContext {
    pub fn new(this_build: BuildRef) -> Self {
        Self {
            this_build,
            other_builds: Vec::new(),
            other_projects: Vec::new(),
        }
    }
}
