//! Lifecycle Coordinator
//!
//! Callback surface the job scheduler invokes when a job is triggered,
//! starts or completes. Every callback updates the correlation store and
//! never blocks on a review server: feedback goes through the dispatch
//! queue. Failures below this boundary are logged, not returned.

pub mod unsuccessful;

use std::sync::Arc;
use tally_domain::{
    BuildRef, BuildRun, BuildsStartedStats, CorrelationStore, EventImprint,
    EventLifecycleListener, JobPolicy, MemoryReport, PriorBuild, ReviewCause, ReviewEvent,
    TriggerContext, WorkspaceReader, normalize_causes,
};
use tally_shared::config::FeatureFlags;
use tally_shared::{BuildResult, EventKey, JobName};
use tracing::{debug, error, info, warn};

use crate::notification::NotificationFactory;
use crate::render::RenderContext;
use unsuccessful::read_unsuccessful_message;

pub struct LifecycleCoordinator {
    store: Arc<CorrelationStore>,
    notifications: NotificationFactory,
    render: Arc<RenderContext>,
    workspace: Arc<dyn WorkspaceReader>,
    features: FeatureFlags,
    listeners: Vec<Arc<dyn EventLifecycleListener>>,
}

impl LifecycleCoordinator {
    pub fn new(
        store: Arc<CorrelationStore>,
        notifications: NotificationFactory,
        render: Arc<RenderContext>,
        workspace: Arc<dyn WorkspaceReader>,
        features: FeatureFlags,
    ) -> Self {
        Self {
            store,
            notifications,
            render,
            workspace,
            features,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventLifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    pub fn on_triggered(&self, event: &ReviewEvent, job: &JobName) {
        self.store.register_trigger(event, job);
        info!(event = %event.key(), job = %job, "Project triggered");
        for listener in &self.listeners {
            listener.project_triggered(event, job);
        }
    }

    /// `prior` lists the builds of the earlier run, used when the event has
    /// already been forgotten
    pub fn on_retriggered(&self, event: &ReviewEvent, job: &JobName, prior: &[PriorBuild]) {
        if let Some(replaced) = self.store.register_retrigger(event, job, prior) {
            self.render.environment.release(&replaced);
        }
        info!(event = %event.key(), job = %job, siblings = prior.len(), "Project retriggered");
        for listener in &self.listeners {
            listener.project_triggered(event, job);
        }
    }

    pub fn on_started(&self, run: &mut BuildRun) {
        let Some(cause) = self.review_cause(run) else {
            return;
        };
        let event = &cause.event;
        let key = event.key();
        self.render.environment.record(run);

        let policy = self.render.policies.policy(&run.build.job);
        let silent = cause.silent || policy.as_deref().is_some_and(|p| p.silent_mode);
        let accepted = self.store.record_started(&key, &run.build, silent);
        if !accepted {
            debug!(event = %key, build = %run.build, "Started build has no open entry for the event");
            let tracked = self
                .store
                .builds(&key)
                .is_some_and(|builds| builds.contains(&run.build));
            if !tracked {
                self.render.environment.release(&run.build);
            }
        }
        for listener in &self.listeners {
            listener.build_started(event, &run.build);
        }

        let silent_start = policy.as_deref().is_some_and(|p| p.silent_start_mode);
        if accepted && !silent && !silent_start && event.has_change() {
            let stats = self
                .store
                .started_stats(&key)
                .unwrap_or(BuildsStartedStats { started: 1, total: 1 });
            if let Err(e) = self.notifications.queue_build_started(event, &run.build, stats) {
                error!(event = %key, build = %run.build, error = %e, "Could not queue build started feedback");
            }
        }

        if let Some(report) = self.store.status_report(&key) {
            debug!(event = %key, "Status:\n{}", report);
        }
    }

    pub fn on_completed(&self, run: &mut BuildRun) {
        let Some(cause) = self.review_cause(run) else {
            return;
        };
        let event = &cause.event;
        let key = event.key();
        let result = run.result.unwrap_or(BuildResult::NotBuilt);
        self.render.environment.record(run);

        let policy = self.render.policies.policy(&run.build.job);
        let silent = cause.silent || policy.as_deref().is_some_and(|p| p.silent_mode);
        // The message must be in place before the entry turns terminal,
        // otherwise a sibling may claim the event without it.
        let message = match policy.as_deref() {
            Some(policy) if !silent && result.is_worse_than(BuildResult::Success) => {
                self.unsuccessful_message(&key, run, policy)
            }
            _ => None,
        };
        if !self
            .store
            .record_completed_with_message(&key, &run.build, result, silent, message)
        {
            debug!(event = %key, build = %run.build, "Completed build belongs to an unknown event");
            self.render.environment.release(&run.build);
        }
        for listener in &self.listeners {
            listener.build_completed(event, &run.build, result);
        }

        self.try_resolve(&key);
    }

    /// The job was removed from the scheduler queue before it started
    pub fn on_queue_cancelled(&self, job: &JobName, event: &ReviewEvent) {
        let key = event.key();
        if self.store.record_cancelled(&key, job) {
            info!(event = %key, job = %job, "Queued build cancelled");
            self.try_resolve(&key);
        }
    }

    /// Send the aggregate feedback held back for delayed approval. Returns
    /// false when the event is unknown, unresolved or already sent.
    pub fn release_delayed(&self, event: &ReviewEvent) -> bool {
        let key = event.key();
        match self.store.claim_resolved(&key, |_| true) {
            Some(imprint) => {
                info!(event = %key, "Releasing delayed approval");
                self.finish(&key, imprint);
                true
            }
            None => false,
        }
    }

    /// Drop a deleted job from every event that still waits for it
    pub fn notify_project_removed(&self, job: &JobName) {
        self.render.environment.release_job(job);
        for key in self.store.remove_job(job) {
            info!(event = %key, job = %job, "Removed project from event");
            self.try_resolve(&key);
        }
    }

    // ========================================================================
    // Build step hooks
    // ========================================================================

    pub fn set_build_custom_url(&self, run: &BuildRun, url: impl Into<String>) -> bool {
        match self.review_key(run) {
            Some(key) => self.store.set_custom_url(&key, &run.build, url.into()),
            None => false,
        }
    }

    pub fn set_build_unsuccessful_message(&self, run: &BuildRun, message: impl Into<String>) -> bool {
        match self.review_key(run) {
            Some(key) => self
                .store
                .set_unsuccessful_message(&key, &run.build, message.into()),
            None => false,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_building(&self, event: &ReviewEvent) -> bool {
        self.store.is_building(&event.key())
    }

    pub fn is_building_job(&self, job: &JobName, event: &ReviewEvent) -> bool {
        self.store.is_building_job(&event.key(), job)
    }

    pub fn is_triggered(&self, job: &JobName, event: &ReviewEvent) -> bool {
        self.store.is_triggered(&event.key(), job)
    }

    /// Triggered by the event and not finished yet
    pub fn is_project_triggered_and_incomplete(&self, job: &JobName, event: &ReviewEvent) -> bool {
        let key = event.key();
        self.store.is_triggered(&key, job) && self.store.is_building_job(&key, job)
    }

    pub fn is_all_builds_started(&self, event: &ReviewEvent) -> bool {
        self.store.is_all_builds_started(&event.key())
    }

    pub fn builds(&self, event: &ReviewEvent) -> Option<Vec<BuildRef>> {
        self.store.builds(&event.key())
    }

    pub fn builds_started_stats(&self, event: &ReviewEvent) -> Option<BuildsStartedStats> {
        self.store.started_stats(&event.key())
    }

    pub fn status_report(&self, event: &ReviewEvent) -> Option<String> {
        self.store.status_report(&event.key())
    }

    pub fn trigger_context(&self, run: &BuildRun) -> Option<TriggerContext> {
        let key = self.review_key(run)?;
        self.store.trigger_context(&key, &run.build)
    }

    pub fn report(&self) -> MemoryReport {
        self.store.report()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Collapse duplicate causes and return the review cause the run is
    /// correlated by
    fn review_cause(&self, run: &mut BuildRun) -> Option<ReviewCause> {
        let removed = normalize_causes(&mut run.causes);
        if removed > 0 {
            debug!(build = %run.build, removed, "Removed duplicate review causes");
        }
        let cause = run.review_cause().cloned();
        if cause.is_none() {
            debug!(build = %run.build, "Build was not triggered by a review event");
        }
        cause
    }

    fn review_key(&self, run: &BuildRun) -> Option<EventKey> {
        run.review_cause().map(ReviewCause::event_key)
    }

    fn unsuccessful_message(&self, key: &EventKey, run: &BuildRun, policy: &JobPolicy) -> Option<String> {
        match read_unsuccessful_message(run, policy, &self.render.environment, &self.workspace) {
            Ok(Some(message)) => {
                debug!(event = %key, build = %run.build, "Captured unsuccessful message");
                Some(message)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(event = %key, build = %run.build, error = %e, "Could not read unsuccessful message");
                None
            }
        }
    }

    fn holds_for_approval(&self, imprint: &EventImprint) -> bool {
        self.features.delayed_approval_enabled
            && imprint.entries().iter().any(|entry| {
                self.render
                    .policies
                    .policy(&entry.job)
                    .is_some_and(|p| p.delayed_approval)
            })
    }

    fn try_resolve(&self, key: &EventKey) {
        if let Some(imprint) = self
            .store
            .claim_resolved(key, |imprint| !self.holds_for_approval(imprint))
        {
            self.finish(key, imprint);
            return;
        }

        let Some(imprint) = self.store.snapshot(key) else {
            return;
        };
        if imprint.is_claimed() {
            return;
        }
        if imprint.is_fully_resolved() {
            info!(event = %key, "All builds completed, holding feedback for delayed approval");
        } else {
            info!(
                event = %key,
                "Waiting for more builds to complete. Status:\n{}",
                imprint.status_report()
            );
        }
    }

    /// Send the aggregate feedback for a claimed imprint and forget it
    fn finish(&self, key: &EventKey, imprint: EventImprint) {
        let event = imprint.event();
        info!(event = %key, "All builds completed");
        for listener in &self.listeners {
            listener.all_builds_completed(event);
        }

        if imprint.reportable_entries().next().is_none() {
            debug!(event = %key, "No reportable builds, skipping feedback");
        } else if !event.has_change() {
            debug!(event = %key, "Event has no change, skipping feedback");
        } else if let Err(e) = self.notifications.queue_build_completed(&imprint) {
            error!(event = %key, error = %e, "Could not queue build completed feedback");
        }

        for build in imprint.builds() {
            self.render.environment.release(&build);
        }
        self.store.forget(key);
    }
}
