//! Trigger causes and build runs
//!
//! A build run carries the causes that scheduled it. The scheduler may merge
//! several triggers into one run during its quiet period, leaving identical
//! causes behind; [`normalize_causes`] collapses them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tally_shared::{BuildResult, EventKey};

use super::BuildRef;
use crate::events::ReviewEvent;

/// A review event scheduled this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCause {
    pub event: ReviewEvent,
    /// No feedback is sent for this run
    #[serde(default)]
    pub silent: bool,
    /// User who retriggered the event by hand, if any
    #[serde(default)]
    pub user: Option<String>,
}

impl ReviewCause {
    pub fn new(event: ReviewEvent) -> Self {
        Self {
            event,
            silent: false,
            user: None,
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn event_key(&self) -> EventKey {
        self.event.key()
    }
}

/// Why a build run was scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cause {
    Review(ReviewCause),
    Manual { user: String },
    Upstream { job: String, build: u64 },
    Timer,
}

/// One build run as reported by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRun {
    pub build: BuildRef,
    pub causes: Vec<Cause>,
    /// Set once the run has finished
    #[serde(default)]
    pub result: Option<BuildResult>,
    /// Workspace the run executed in
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Build environment used for `$VAR` expansion
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl BuildRun {
    pub fn new(build: BuildRef, causes: Vec<Cause>) -> Self {
        Self {
            build,
            causes,
            result: None,
            workspace: None,
            environment: HashMap::new(),
        }
    }

    pub fn with_result(mut self, result: BuildResult) -> Self {
        self.result = Some(result);
        self
    }

    /// First review cause, the one the run is correlated by
    pub fn review_cause(&self) -> Option<&ReviewCause> {
        self.causes.iter().find_map(|cause| match cause {
            Cause::Review(review) => Some(review),
            _ => None,
        })
    }
}

/// Collapse duplicate review causes on one run.
///
/// The first review cause is canonical. Later causes structurally equal to
/// it are removed; every other cause is kept in order. Returns how many
/// causes were removed.
pub fn normalize_causes(causes: &mut Vec<Cause>) -> usize {
    let Some(canonical) = causes
        .iter()
        .find(|cause| matches!(cause, Cause::Review(_)))
        .cloned()
    else {
        return 0;
    };

    let before = causes.len();
    let mut seen = false;
    causes.retain(|cause| {
        if *cause != canonical {
            return true;
        }
        if seen {
            false
        } else {
            seen = true;
            true
        }
    });
    before - causes.len()
}
