#![allow(dead_code)]
//! Shared harness for the lifecycle integration tests
//!
//! Wires a coordinator to a started dispatch queue whose transport records
//! every command on a channel the test can await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tally_application::{
    DispatchQueue, LifecycleCoordinator, NotificationFactory, RenderContext, ShutdownMode,
};
use tally_domain::{
    BuildEnvironments, BuildRef, BuildRun, Cause, Change, CommandTransport, CorrelationStore,
    EventKind, EventLifecycleListener, FeedbackKind, FeedbackObserver, FsWorkspaceReader,
    JobCatalog, PatchSet, ReviewCause, ReviewEvent, TransportError, WorkspaceReader,
};
use tally_shared::config::{DispatchConfig, FeatureFlags, ServerConfig};
use tally_shared::{BuildResult, JobName, ServerName};

pub struct RecordingTransport {
    sent: mpsc::UnboundedSender<(ServerName, String)>,
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn send_command(&self, server: &ServerName, command: &str) -> Result<(), TransportError> {
        let _ = self.sent.send((server.clone(), command.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub sent: Mutex<Vec<(FeedbackKind, String)>>,
}

impl FeedbackObserver for RecordingObserver {
    fn feedback_sent(&self, _server: &ServerName, kind: FeedbackKind, command: &str) {
        self.sent.lock().push((kind, command.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub calls: Mutex<Vec<String>>,
}

impl EventLifecycleListener for RecordingListener {
    fn project_triggered(&self, _event: &ReviewEvent, job: &JobName) {
        self.calls.lock().push(format!("triggered {}", job));
    }

    fn build_started(&self, _event: &ReviewEvent, build: &BuildRef) {
        self.calls.lock().push(format!("started {}", build));
    }

    fn build_completed(&self, _event: &ReviewEvent, build: &BuildRef, result: BuildResult) {
        self.calls.lock().push(format!("completed {} {}", build, result));
    }

    fn all_builds_completed(&self, _event: &ReviewEvent) {
        self.calls.lock().push("all completed".to_string());
    }
}

pub struct TestStack {
    pub coordinator: Arc<LifecycleCoordinator>,
    pub catalog: Arc<JobCatalog>,
    pub store: Arc<CorrelationStore>,
    pub queue: Arc<DispatchQueue>,
    pub observer: Arc<RecordingObserver>,
    pub listener: Arc<RecordingListener>,
    pub environments: Arc<BuildEnvironments>,
    sent: mpsc::UnboundedReceiver<(ServerName, String)>,
}

impl TestStack {
    pub fn new() -> Self {
        Self::with_server(ServerConfig::new("default").with_front_end_url("http://ci.example.com"))
    }

    pub fn with_server(server: ServerConfig) -> Self {
        Self::build(server, Arc::new(FsWorkspaceReader))
    }

    pub fn with_workspace(workspace: Arc<dyn WorkspaceReader>) -> Self {
        Self::build(
            ServerConfig::new("default").with_front_end_url("http://ci.example.com"),
            workspace,
        )
    }

    fn build(server: ServerConfig, workspace: Arc<dyn WorkspaceReader>) -> Self {
        let catalog = Arc::new(JobCatalog::new());
        let store = Arc::new(CorrelationStore::new());
        let environments = Arc::new(BuildEnvironments::new(HashMap::new()));
        let render = Arc::new(RenderContext::new(catalog.clone(), environments.clone()));
        let (tx, sent) = mpsc::unbounded_channel();
        let servers = vec![server];

        let queue = Arc::new(DispatchQueue::new(
            DispatchConfig::default(),
            servers.clone(),
            Arc::new(RecordingTransport { sent: tx }),
            render.clone(),
        ));
        let observer = Arc::new(RecordingObserver::default());
        queue.add_observer(observer.clone());
        queue.start().expect("dispatch queue starts");

        let listener = Arc::new(RecordingListener::default());
        let coordinator = LifecycleCoordinator::new(
            store.clone(),
            NotificationFactory::new(queue.clone(), render.clone(), servers),
            render,
            workspace,
            FeatureFlags::default(),
        )
        .with_listener(listener.clone());

        Self {
            coordinator: Arc::new(coordinator),
            catalog,
            store,
            queue,
            observer,
            listener,
            environments,
            sent,
        }
    }

    pub async fn next_command(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("a command is sent in time")
            .expect("transport channel open")
            .1
    }

    /// Wait briefly, then return everything sent so far
    pub async fn drain(&mut self) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut commands = Vec::new();
        while let Ok((_, command)) = self.sent.try_recv() {
            commands.push(command);
        }
        commands
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown(ShutdownMode::Graceful).await;
    }
}

pub fn patchset_created(change: u64, patch_set: u32) -> ReviewEvent {
    let mut event = ReviewEvent::for_patch_set(
        EventKind::PatchsetCreated,
        "default",
        Change {
            project: "platform/core".to_string(),
            branch: "main".to_string(),
            id: format!("I{:040}", change),
            number: change,
            topic: None,
        },
        PatchSet {
            number: patch_set,
            revision: "4b825dc642cb".to_string(),
            ref_spec: None,
        },
    );
    event.received_on = 1_700_000_000_000;
    event
}

pub fn build_run(job: &str, number: u64, event: &ReviewEvent) -> BuildRun {
    BuildRun::new(
        BuildRef::new(job, number),
        vec![Cause::Review(ReviewCause::new(event.clone()))],
    )
}
