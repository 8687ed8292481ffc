//! Correlation Store
//!
//! Process-wide registry of event imprints. Every public method locks only the
//! shard holding the event, so callbacks for unrelated events do not contend
//! and each operation is atomic with respect to one imprint.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tally_shared::{BuildResult, EventKey, JobName};
use tracing::{debug, warn};

use super::imprint::{BuildsStartedStats, EventImprint, PriorBuild};
use super::report::{ImprintReport, MemoryReport, TriggerContext};
use crate::events::ReviewEvent;
use crate::jobs::BuildRef;

#[derive(Debug, Default)]
pub struct CorrelationStore {
    imprints: DashMap<EventKey, EventImprint>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for `job` under `event`, creating the imprint on first use.
    /// An existing entry is kept as is.
    pub fn register_trigger(&self, event: &ReviewEvent, job: &JobName) {
        self.imprints
            .entry(event.key())
            .or_insert_with(|| EventImprint::new(event.clone()))
            .set_triggered(job);
    }

    /// Reset `job`'s entry for a new run.
    ///
    /// When the event is no longer remembered a fresh imprint is seeded from
    /// `prior`, the sibling builds of the earlier run. Returns the build the
    /// new run replaces, if the entry had one.
    pub fn register_retrigger(
        &self,
        event: &ReviewEvent,
        job: &JobName,
        prior: &[PriorBuild],
    ) -> Option<BuildRef> {
        match self.imprints.entry(event.key()) {
            MapEntry::Occupied(mut occupied) => occupied.get_mut().reset(job),
            MapEntry::Vacant(vacant) => {
                let mut imprint = EventImprint::new(event.clone());
                for sibling in prior {
                    imprint.set_prior(sibling);
                }
                let replaced = imprint.reset(job);
                vacant.insert(imprint);
                replaced
            }
        }
    }

    /// Resolve the build number of a triggered entry.
    ///
    /// Returns false, without changing anything, when the event or the job's
    /// entry is unknown or the entry is already terminal.
    pub fn record_started(&self, key: &EventKey, build: &BuildRef, silent: bool) -> bool {
        match self.imprints.get_mut(key) {
            Some(mut imprint) => imprint.set_started(build, silent),
            None => false,
        }
    }

    /// Mark the entry terminal with `result`; false when the event is unknown
    pub fn record_completed(
        &self,
        key: &EventKey,
        build: &BuildRef,
        result: BuildResult,
        silent: bool,
    ) -> bool {
        self.record_completed_with_message(key, build, result, silent, None)
    }

    /// Like [`Self::record_completed`], attaching the build's unsuccessful
    /// message under the same lock so no claimer sees one without the other
    pub fn record_completed_with_message(
        &self,
        key: &EventKey,
        build: &BuildRef,
        result: BuildResult,
        silent: bool,
        message: Option<String>,
    ) -> bool {
        let Some(mut imprint) = self.imprints.get_mut(key) else {
            return false;
        };
        if !imprint.set_completed(build, result, silent) {
            return false;
        }
        if let Some(message) = message {
            imprint.set_unsuccessful_message(build, message);
        }
        true
    }

    /// Mark `job` as removed from the queue before it started
    pub fn record_cancelled(&self, key: &EventKey, job: &JobName) -> bool {
        match self.imprints.get_mut(key) {
            Some(mut imprint) => {
                imprint.set_cancelled(job);
                true
            }
            None => false,
        }
    }

    pub fn is_fully_resolved(&self, key: &EventKey) -> bool {
        self.imprints
            .get(key)
            .is_some_and(|imprint| imprint.is_fully_resolved())
    }

    /// Point-in-time copy of the imprint
    pub fn snapshot(&self, key: &EventKey) -> Option<EventImprint> {
        self.imprints.get(key).map(|imprint| imprint.value().clone())
    }

    /// Claim the right to send the aggregate feedback.
    ///
    /// Succeeds at most once per imprint: only when every entry is terminal,
    /// no one claimed it before, and `allow` accepts the imprint. The check
    /// and the claim happen under one lock. Returns the claimed snapshot.
    pub fn claim_resolved<F>(&self, key: &EventKey, allow: F) -> Option<EventImprint>
    where
        F: FnOnce(&EventImprint) -> bool,
    {
        let mut imprint = self.imprints.get_mut(key)?;
        if imprint.is_claimed() || !imprint.is_fully_resolved() || !allow(imprint.value()) {
            return None;
        }
        imprint.claim();
        Some(imprint.value().clone())
    }

    /// Drop the imprint; later lookups treat the event as unknown
    pub fn forget(&self, key: &EventKey) -> Option<EventImprint> {
        let removed = self.imprints.remove(key).map(|(_, imprint)| imprint);
        if removed.is_none() {
            debug!(event = %key, "Forget requested for unknown event");
        }
        removed
    }

    /// Any entry of the event is not yet terminal
    pub fn is_building(&self, key: &EventKey) -> bool {
        self.imprints
            .get(key)
            .is_some_and(|imprint| imprint.entries().iter().any(|e| e.is_building()))
    }

    /// `job` has an entry under the event that is not yet terminal
    pub fn is_building_job(&self, key: &EventKey, job: &JobName) -> bool {
        self.imprints
            .get(key)
            .and_then(|imprint| imprint.entry(job).map(|e| e.is_building()))
            .unwrap_or(false)
    }

    pub fn is_triggered(&self, key: &EventKey, job: &JobName) -> bool {
        self.imprints
            .get(key)
            .is_some_and(|imprint| imprint.entry(job).is_some())
    }

    pub fn is_all_builds_started(&self, key: &EventKey) -> bool {
        self.imprints
            .get(key)
            .is_some_and(|imprint| imprint.is_all_started())
    }

    pub fn builds(&self, key: &EventKey) -> Option<Vec<BuildRef>> {
        self.imprints.get(key).map(|imprint| imprint.builds())
    }

    pub fn started_stats(&self, key: &EventKey) -> Option<BuildsStartedStats> {
        self.imprints.get(key).map(|imprint| imprint.started_stats())
    }

    pub fn status_report(&self, key: &EventKey) -> Option<String> {
        self.imprints.get(key).map(|imprint| imprint.status_report())
    }

    pub fn set_custom_url(&self, key: &EventKey, build: &BuildRef, url: String) -> bool {
        let updated = self
            .imprints
            .get_mut(key)
            .is_some_and(|mut imprint| imprint.set_custom_url(build, url));
        if !updated {
            warn!(event = %key, build = %build, "No entry to attach custom URL to");
        }
        updated
    }

    pub fn set_unsuccessful_message(&self, key: &EventKey, build: &BuildRef, message: String) -> bool {
        let updated = self
            .imprints
            .get_mut(key)
            .is_some_and(|mut imprint| imprint.set_unsuccessful_message(build, message));
        if !updated {
            warn!(event = %key, build = %build, "No entry to attach unsuccessful message to");
        }
        updated
    }

    /// Drop `job`'s entries from every imprint; returns the affected events
    pub fn remove_job(&self, job: &JobName) -> Vec<EventKey> {
        let mut affected = Vec::new();
        for mut imprint in self.imprints.iter_mut() {
            if imprint.remove_job(job) {
                affected.push(imprint.key().clone());
            }
        }
        affected
    }

    /// Where `build` sits among the other builds of the event
    pub fn trigger_context(&self, key: &EventKey, build: &BuildRef) -> Option<TriggerContext> {
        let imprint = self.imprints.get(key)?;
        let mut context = TriggerContext::new(build.clone());
        for entry in imprint.entries() {
            match entry.build_ref() {
                Some(other) if !other.matches(build) => context.other_builds.push(other),
                Some(_) => {}
                None if entry.job != build.job => context.other_projects.push(entry.job.clone()),
                None => {}
            }
        }
        Some(context)
    }

    /// Copy of every imprint, ordered by event key
    pub fn report(&self) -> MemoryReport {
        let mut events: Vec<ImprintReport> = self
            .imprints
            .iter()
            .map(|item| ImprintReport {
                key: item.key().clone(),
                event: item.event().clone(),
                entries: item.entries().to_vec(),
            })
            .collect();
        events.sort_by(|a, b| a.key.cmp(&b.key));
        MemoryReport { events }
    }

    pub fn len(&self) -> usize {
        self.imprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imprints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fixtures::patchset_created;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_shared::EntryState;

    fn job(name: &str) -> JobName {
        JobName::from(name)
    }

    #[test]
    fn test_register_trigger_is_idempotent() {
        let store = CorrelationStore::new();
        let event = patchset_created(1, 1);
        store.register_trigger(&event, &job("a"));
        store.register_trigger(&event, &job("a"));
        store.register_trigger(&event, &job("b"));

        let snapshot = store.snapshot(&event.key()).unwrap();
        assert_eq!(snapshot.entries().len(), 2);
        assert!(store.is_triggered(&event.key(), &job("b")));
        assert!(!store.is_triggered(&event.key(), &job("c")));
    }

    #[test]
    fn test_concurrent_triggers_do_not_lose_entries() {
        let store = Arc::new(CorrelationStore::new());
        let event = patchset_created(2, 1);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let event = event.clone();
                std::thread::spawn(move || {
                    store.register_trigger(&event, &JobName::new(format!("job-{i}")))
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.snapshot(&event.key()).unwrap().entries().len(), 16);
    }

    #[test]
    fn test_record_started_for_unknown_job_is_noop() {
        let store = CorrelationStore::new();
        let event = patchset_created(1, 1);
        assert!(!store.record_started(&event.key(), &BuildRef::new("a", 1), false));
        assert!(store.is_empty());

        store.register_trigger(&event, &job("a"));
        assert!(!store.record_started(&event.key(), &BuildRef::new("b", 1), false));
        assert_eq!(store.snapshot(&event.key()).unwrap().entries().len(), 1);
    }

    #[test]
    fn test_retrigger_replaces_completed_entry() {
        let store = CorrelationStore::new();
        let event = patchset_created(3, 1);
        let key = event.key();
        store.register_trigger(&event, &job("a"));
        store.register_trigger(&event, &job("b"));
        store.record_completed(&key, &BuildRef::new("a", 1), BuildResult::Failure, false);
        store.record_started(&key, &BuildRef::new("b", 1), false);

        let replaced = store.register_retrigger(&event, &job("a"), &[]);
        assert_eq!(replaced, Some(BuildRef::new("a", 1)));

        let snapshot = store.snapshot(&key).unwrap();
        assert_eq!(snapshot.entry(&job("a")).unwrap().state, EntryState::Triggered);
        assert_eq!(snapshot.entries().len(), 2);

        store.record_completed(&key, &BuildRef::new("b", 1), BuildResult::Success, false);
        assert!(!store.is_fully_resolved(&key));

        store.record_started(&key, &BuildRef::new("a", 2), false);
        store.record_completed(&key, &BuildRef::new("a", 2), BuildResult::Success, false);
        assert!(store.is_fully_resolved(&key));
    }

    #[test]
    fn test_late_start_after_completion_keeps_event_resolved() {
        let store = CorrelationStore::new();
        let event = patchset_created(3, 2);
        let key = event.key();
        store.register_trigger(&event, &job("a"));
        store.record_completed(&key, &BuildRef::new("a", 1), BuildResult::Success, false);

        assert!(!store.record_started(&key, &BuildRef::new("a", 1), false));

        let snapshot = store.snapshot(&key).unwrap();
        assert_eq!(
            snapshot.entry(&job("a")).unwrap().state,
            EntryState::Completed(BuildResult::Success)
        );
        assert!(store.is_fully_resolved(&key));
        assert!(!store.is_building(&key));
    }

    #[test]
    fn test_completion_and_message_land_together() {
        let store = CorrelationStore::new();
        let event = patchset_created(3, 3);
        let key = event.key();
        store.register_trigger(&event, &job("a"));

        assert!(store.record_completed_with_message(
            &key,
            &BuildRef::new("a", 2),
            BuildResult::Failure,
            false,
            Some("compile error in foo.rs".to_string()),
        ));

        let claimed = store.claim_resolved(&key, |_| true).unwrap();
        let entry = claimed.entry(&job("a")).unwrap();
        assert_eq!(entry.state, EntryState::Completed(BuildResult::Failure));
        assert_eq!(entry.unsuccessful_message.as_deref(), Some("compile error in foo.rs"));

        let unknown = patchset_created(99, 1);
        assert!(!store.record_completed_with_message(
            &unknown.key(),
            &BuildRef::new("a", 2),
            BuildResult::Failure,
            false,
            Some("ignored".to_string()),
        ));
        assert!(store.snapshot(&unknown.key()).is_none());
    }

    #[test]
    fn test_retrigger_of_forgotten_event_preserves_siblings() {
        let store = CorrelationStore::new();
        let event = patchset_created(4, 1);
        let key = event.key();
        let prior = vec![
            PriorBuild {
                build: BuildRef::new("a", 7),
                result: Some(BuildResult::Failure),
            },
            PriorBuild {
                build: BuildRef::new("b", 3),
                result: Some(BuildResult::Success),
            },
        ];

        store.register_retrigger(&event, &job("a"), &prior);

        let snapshot = store.snapshot(&key).unwrap();
        assert_eq!(snapshot.entries().len(), 2);
        assert_eq!(snapshot.entry(&job("a")).unwrap().state, EntryState::Triggered);
        assert_eq!(
            snapshot.entry(&job("b")).unwrap().state,
            EntryState::Completed(BuildResult::Success)
        );
        assert!(!store.is_fully_resolved(&key));
    }

    #[test]
    fn test_claim_succeeds_once() {
        let store = CorrelationStore::new();
        let event = patchset_created(5, 1);
        let key = event.key();
        store.register_trigger(&event, &job("a"));
        assert!(store.claim_resolved(&key, |_| true).is_none());

        store.record_completed(&key, &BuildRef::new("a", 1), BuildResult::Success, false);
        assert!(store.claim_resolved(&key, |_| false).is_none());
        assert!(store.claim_resolved(&key, |_| true).is_some());
        assert!(store.claim_resolved(&key, |_| true).is_none());

        assert!(store.forget(&key).is_some());
        assert!(store.forget(&key).is_none());
        assert!(store.snapshot(&key).is_none());
    }

    #[test]
    fn test_concurrent_completion_claims_exactly_once() {
        let store = Arc::new(CorrelationStore::new());
        let event = patchset_created(6, 1);
        let key = event.key();
        for i in 0..8 {
            store.register_trigger(&event, &JobName::new(format!("job-{i}")));
        }

        let claims = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let claims = Arc::clone(&claims);
                let key = key.clone();
                std::thread::spawn(move || {
                    let build = BuildRef::new(format!("job-{i}"), 1);
                    store.record_completed(&key, &build, BuildResult::Success, false);
                    if store.claim_resolved(&key, |_| true).is_some() {
                        claims.fetch_add(1, Ordering::SeqCst);
                        store.forget(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(claims.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_is_building_queries() {
        let store = CorrelationStore::new();
        let event = patchset_created(7, 1);
        let key = event.key();
        assert!(!store.is_building(&key));

        store.register_trigger(&event, &job("a"));
        store.register_trigger(&event, &job("b"));
        assert!(store.is_building(&key));
        assert!(store.is_building_job(&key, &job("a")));

        store.record_cancelled(&key, &job("a"));
        assert!(!store.is_building_job(&key, &job("a")));
        assert!(store.is_building(&key));

        store.record_completed(&key, &BuildRef::new("b", 1), BuildResult::Aborted, false);
        assert!(!store.is_building(&key));
        assert!(!store.is_building_job(&key, &job("zzz")));
    }

    #[test]
    fn test_cancel_for_unknown_event_creates_nothing() {
        let store = CorrelationStore::new();
        let event = patchset_created(8, 1);
        assert!(!store.record_cancelled(&event.key(), &job("a")));
        assert!(store.is_empty());
        assert!(store.snapshot(&event.key()).is_none());
    }

    #[test]
    fn test_remove_job_from_every_imprint() {
        let store = CorrelationStore::new();
        let first = patchset_created(8, 1);
        let second = patchset_created(8, 2);
        store.register_trigger(&first, &job("a"));
        store.register_trigger(&first, &job("b"));
        store.register_trigger(&second, &job("a"));

        let mut affected = store.remove_job(&job("a"));
        affected.sort();
        assert_eq!(affected, vec![first.key(), second.key()]);
        assert!(!store.is_triggered(&first.key(), &job("a")));
        assert!(store.is_fully_resolved(&second.key()));
    }

    #[test]
    fn test_trigger_context() {
        let store = CorrelationStore::new();
        let event = patchset_created(9, 1);
        let key = event.key();
        for name in ["a", "b", "c"] {
            store.register_trigger(&event, &job(name));
        }
        store.record_started(&key, &BuildRef::new("a", 1), false);
        store.record_started(&key, &BuildRef::new("b", 4), false);

        let context = store.trigger_context(&key, &BuildRef::new("a", 1)).unwrap();
        assert_eq!(context.this_build, BuildRef::new("a", 1));
        assert_eq!(context.other_builds, vec![BuildRef::new("b", 4)]);
        assert_eq!(context.other_projects, vec![job("c")]);
    }

    #[test]
    fn test_report_is_sorted_and_serializable() {
        let store = CorrelationStore::new();
        store.register_trigger(&patchset_created(2, 1), &job("a"));
        store.register_trigger(&patchset_created(1, 1), &job("b"));

        let report = store.report();
        assert_eq!(report.events.len(), 2);
        assert!(report.events[0].key < report.events[1].key);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["events"][0]["entries"][0]["job"], "b");
    }
}
