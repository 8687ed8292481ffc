//! Event imprints
//!
//! An imprint is the record of one event: the event itself and one entry per
//! job it triggered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use tally_shared::{BuildResult, EntryState, JobName};

use crate::events::ReviewEvent;
use crate::jobs::BuildRef;

/// One job's participation in one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub job: JobName,
    pub build: Option<u64>,
    pub state: EntryState,
    /// Feedback for this job is suppressed
    pub silent: bool,
    pub custom_url: Option<String>,
    pub unsuccessful_message: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(job: JobName) -> Self {
        Self {
            job,
            build: None,
            state: EntryState::Triggered,
            silent: false,
            custom_url: None,
            unsuccessful_message: None,
            triggered_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn build_ref(&self) -> Option<BuildRef> {
        self.build.map(|number| BuildRef::new(self.job.clone(), number))
    }

    pub fn result(&self) -> Option<BuildResult> {
        self.state.result()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == EntryState::Cancelled
    }

    /// Whether `build` refers to this entry's job and, if both are known,
    /// the same build number
    pub fn matches(&self, build: &BuildRef) -> bool {
        match self.build_ref() {
            Some(own) => own.matches(build),
            None => self.job == build.job,
        }
    }

    /// Still counts as running for the scheduler
    pub fn is_building(&self) -> bool {
        !self.is_terminal()
    }

    fn mark_started(&mut self, number: u64) {
        self.build = Some(number);
        self.state = EntryState::Building;
        self.started_at = Some(Utc::now());
    }

    fn mark_completed(&mut self, number: u64, result: BuildResult) {
        if self.build.is_none() {
            self.build = Some(number);
            self.started_at.get_or_insert_with(Utc::now);
        }
        self.state = EntryState::Completed(result);
        self.completed_at = Some(Utc::now());
    }

    fn reset(&mut self) {
        self.build = None;
        self.state = EntryState::Triggered;
        self.started_at = None;
        self.completed_at = None;
        self.unsuccessful_message = None;
    }
}

/// `(started/total)` progress shown in "started" feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildsStartedStats {
    pub started: usize,
    pub total: usize,
}

impl fmt::Display for BuildsStartedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.started, self.total)
    }
}

/// Previous build of a sibling job, folded in on retrigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorBuild {
    pub build: BuildRef,
    /// `None` while the build is still running
    pub result: Option<BuildResult>,
}

/// All entries for one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImprint {
    event: ReviewEvent,
    entries: Vec<Entry>,
    /// Set by the one caller allowed to send the aggregate feedback
    claimed: bool,
}

impl EventImprint {
    pub fn new(event: ReviewEvent) -> Self {
        Self {
            event,
            entries: Vec::new(),
            claimed: false,
        }
    }

    pub fn event(&self) -> &ReviewEvent {
        &self.event
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries whose feedback is not suppressed
    pub fn reportable_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.silent)
    }

    pub fn entry(&self, job: &JobName) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.job == job)
    }

    fn entry_mut(&mut self, job: &JobName) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| &e.job == job)
    }

    fn entry_or_insert(&mut self, job: &JobName) -> &mut Entry {
        let index = match self.entries.iter().position(|e| &e.job == job) {
            Some(index) => index,
            None => {
                self.entries.push(Entry::new(job.clone()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub(crate) fn claim(&mut self) {
        self.claimed = true;
    }

    /// Add an entry for `job` unless one exists
    pub(crate) fn set_triggered(&mut self, job: &JobName) {
        self.entry_or_insert(job);
    }

    /// Reset (or add) the entry for `job` so it waits for a new build.
    /// Returns the build the entry referred to before.
    pub(crate) fn reset(&mut self, job: &JobName) -> Option<BuildRef> {
        let entry = self.entry_or_insert(job);
        let replaced = entry.build_ref();
        entry.reset();
        replaced
    }

    /// Fold in a sibling build from a previous run
    pub(crate) fn set_prior(&mut self, prior: &PriorBuild) {
        let entry = self.entry_or_insert(&prior.build.job);
        entry.build = prior.build.number;
        entry.state = match prior.result {
            Some(result) => EntryState::Completed(result),
            None if prior.build.number.is_some() => EntryState::Building,
            None => EntryState::Triggered,
        };
    }

    /// Resolve the build number; false when the job has no entry or the
    /// entry is already terminal
    pub(crate) fn set_started(&mut self, build: &BuildRef, silent: bool) -> bool {
        let Some(number) = build.number else {
            return false;
        };
        match self.entry_mut(&build.job) {
            Some(entry) if entry.is_terminal() => false,
            Some(entry) => {
                entry.mark_started(number);
                entry.silent |= silent;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_completed(
        &mut self,
        build: &BuildRef,
        result: BuildResult,
        silent: bool,
    ) -> bool {
        let Some(number) = build.number else {
            return false;
        };
        let entry = self.entry_or_insert(&build.job);
        entry.mark_completed(number, result);
        entry.silent |= silent;
        true
    }

    pub(crate) fn set_cancelled(&mut self, job: &JobName) {
        let entry = self.entry_or_insert(job);
        entry.state = EntryState::Cancelled;
        entry.completed_at = Some(Utc::now());
    }

    pub(crate) fn set_custom_url(&mut self, build: &BuildRef, url: String) -> bool {
        match self.entries.iter_mut().find(|e| e.matches(build)) {
            Some(entry) => {
                entry.custom_url = Some(url);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_unsuccessful_message(&mut self, build: &BuildRef, message: String) -> bool {
        match self.entries.iter_mut().find(|e| e.matches(build)) {
            Some(entry) => {
                entry.unsuccessful_message = Some(message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_job(&mut self, job: &JobName) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.job != job);
        before != self.entries.len()
    }

    /// Every entry has a terminal state. Vacuously true without entries.
    pub fn is_fully_resolved(&self) -> bool {
        self.entries.iter().all(Entry::is_terminal)
    }

    /// Every entry has a build number or was cancelled
    pub fn is_all_started(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.build.is_some() || e.is_cancelled())
    }

    pub fn started_stats(&self) -> BuildsStartedStats {
        BuildsStartedStats {
            started: self.entries.iter().filter(|e| e.build.is_some()).count(),
            total: self.entries.len(),
        }
    }

    /// Builds that have a number, in trigger order
    pub fn builds(&self) -> Vec<BuildRef> {
        self.entries.iter().filter_map(Entry::build_ref).collect()
    }

    /// One line per entry, for logs
    pub fn status_report(&self) -> String {
        let mut report = String::new();
        for entry in &self.entries {
            let _ = write!(report, "  Project/Build: [{}]: [#", entry.job.short_name());
            match (entry.build, entry.result()) {
                (Some(number), Some(result)) => {
                    let _ = write!(report, "{}: {}", number, result);
                }
                (Some(number), None) => {
                    let _ = write!(report, "{}: {}", number, entry.state);
                }
                (None, _) => report.push_str("XX: NULL"),
            }
            let _ = writeln!(report, "] Completed: {}", entry.is_terminal());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fixtures::patchset_created;

    fn job(name: &str) -> JobName {
        JobName::from(name)
    }

    #[test]
    fn test_empty_imprint_is_resolved() {
        let imprint = EventImprint::new(patchset_created(1, 1));
        assert!(imprint.is_fully_resolved());
        assert_eq!(imprint.started_stats(), BuildsStartedStats { started: 0, total: 0 });
    }

    #[test]
    fn test_resolution_requires_every_entry_terminal() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("a"));
        imprint.set_triggered(&job("b"));

        assert!(imprint.set_started(&BuildRef::new("a", 1), false));
        assert!(imprint.set_completed(&BuildRef::new("a", 1), BuildResult::Success, false));
        assert!(!imprint.is_fully_resolved());

        imprint.set_cancelled(&job("b"));
        assert!(imprint.is_fully_resolved());
        assert!(imprint.is_all_started());
    }

    #[test]
    fn test_started_without_entry_is_ignored() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        assert!(!imprint.set_started(&BuildRef::new("ghost", 3), false));
        assert!(imprint.entries().is_empty());
    }

    #[test]
    fn test_late_start_does_not_reopen_completed_entry() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("a"));
        imprint.set_completed(&BuildRef::new("a", 4), BuildResult::Success, false);

        assert!(!imprint.set_started(&BuildRef::new("a", 4), false));
        assert!(!imprint.set_started(&BuildRef::new("a", 5), false));

        let entry = imprint.entry(&job("a")).unwrap();
        assert_eq!(entry.state, EntryState::Completed(BuildResult::Success));
        assert_eq!(entry.build, Some(4));
        assert!(imprint.is_fully_resolved());
    }

    #[test]
    fn test_reset_clears_completion() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("a"));
        imprint.set_completed(&BuildRef::new("a", 4), BuildResult::Failure, false);
        imprint.set_unsuccessful_message(&BuildRef::new("a", 4), "boom".to_string());

        assert_eq!(imprint.reset(&job("a")), Some(BuildRef::new("a", 4)));

        let entry = imprint.entry(&job("a")).unwrap();
        assert_eq!(entry.state, EntryState::Triggered);
        assert_eq!(entry.build, None);
        assert_eq!(entry.unsuccessful_message, None);
        assert!(!imprint.is_fully_resolved());
    }

    #[test]
    fn test_started_stats_and_display() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("a"));
        imprint.set_triggered(&job("b"));
        imprint.set_triggered(&job("c"));
        imprint.set_started(&BuildRef::new("b", 9), false);

        let stats = imprint.started_stats();
        assert_eq!(stats.to_string(), "(1/3)");
    }

    #[test]
    fn test_status_report_lists_every_entry() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("folder/a"));
        imprint.set_triggered(&job("b"));
        imprint.set_completed(&BuildRef::new("folder/a", 2), BuildResult::Unstable, false);

        let report = imprint.status_report();
        assert_eq!(
            report,
            "  Project/Build: [a]: [#2: UNSTABLE] Completed: true\n  Project/Build: [b]: [#XX: NULL] Completed: false\n"
        );
    }

    #[test]
    fn test_custom_url_requires_matching_build() {
        let mut imprint = EventImprint::new(patchset_created(1, 1));
        imprint.set_triggered(&job("a"));
        imprint.set_started(&BuildRef::new("a", 5), false);

        assert!(!imprint.set_custom_url(&BuildRef::new("a", 6), "x".to_string()));
        assert!(imprint.set_custom_url(&BuildRef::new("a", 5), "y".to_string()));
        assert_eq!(imprint.entry(&job("a")).unwrap().custom_url.as_deref(), Some("y"));
    }
}
