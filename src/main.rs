// tally: review feedback aggregation
//
// Replays a lifecycle script (one JSON step per line on stdin) through the
// coordinator and prints every command that would be sent to a review
// server.
//
// Run: tally [path/to/.env] < script.jsonl

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tally_application::{
    DispatchQueue, LifecycleCoordinator, NotificationFactory, RenderContext, ShutdownMode,
};
use tally_domain::{
    BuildEnvironments, BuildRun, CommandTransport, CorrelationStore, FsWorkspaceReader,
    JobCatalog, JobPolicy, PriorBuild, ReviewEvent, TransportError,
};
use tally_shared::config::{ConfigLoader, LoggingConfig, ServerConfig};
use tally_shared::{JobName, ServerName};

/// One line of the lifecycle script
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    Policy { job: JobName, policy: JobPolicy },
    Triggered { event: ReviewEvent, job: JobName },
    Retriggered {
        event: ReviewEvent,
        job: JobName,
        #[serde(default)]
        prior: Vec<PriorBuild>,
    },
    Started { run: BuildRun },
    Completed { run: BuildRun },
    Cancelled { event: ReviewEvent, job: JobName },
    Release { event: ReviewEvent },
    Removed { job: JobName },
    Report,
}

/// Prints commands instead of opening a connection to the review server
struct StdoutTransport;

#[async_trait]
impl CommandTransport for StdoutTransport {
    async fn send_command(&self, server: &ServerName, command: &str) -> Result<(), TransportError> {
        info!(server = %server, "Sending command");
        println!("[{}] {}", server, command);
        Ok(())
    }
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn apply(coordinator: &LifecycleCoordinator, catalog: &JobCatalog, step: Step) -> anyhow::Result<()> {
    match step {
        Step::Policy { job, policy } => catalog.register(job, policy),
        Step::Triggered { event, job } => coordinator.on_triggered(&event, &job),
        Step::Retriggered { event, job, prior } => coordinator.on_retriggered(&event, &job, &prior),
        Step::Started { mut run } => coordinator.on_started(&mut run),
        Step::Completed { mut run } => coordinator.on_completed(&mut run),
        Step::Cancelled { event, job } => coordinator.on_queue_cancelled(&job, &event),
        Step::Release { event } => {
            if !coordinator.release_delayed(&event) {
                warn!(event = %event.key(), "Nothing to release");
            }
        }
        Step::Removed { job } => {
            catalog.remove(&job);
            coordinator.notify_project_removed(&job);
        }
        Step::Report => {
            let report = serde_json::to_string_pretty(&coordinator.report())?;
            println!("{}", report);
        }
    }
    Ok(())
}

/// Give the workers a chance to pick up everything the script queued
async fn wait_for_queues(queue: &DispatchQueue, servers: &[ServerConfig], timeout_secs: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    while servers.iter().any(|s| queue.pending(&s.name) > 0) {
        if tokio::time::Instant::now() >= deadline {
            warn!("Dispatch queues still hold commands, giving up");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = std::env::args().nth(1).map(PathBuf::from);
    let config = ConfigLoader::new(env_file)
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(servers = config.servers.len(), "Starting tally");

    let catalog = Arc::new(JobCatalog::new());
    let environment: HashMap<String, String> = std::env::vars().collect();
    let render = Arc::new(RenderContext::new(
        catalog.clone(),
        Arc::new(BuildEnvironments::new(environment)),
    ));

    let queue = Arc::new(DispatchQueue::new(
        config.dispatch.clone(),
        config.servers.clone(),
        Arc::new(StdoutTransport),
        render.clone(),
    ));
    queue.start()?;

    let coordinator = LifecycleCoordinator::new(
        Arc::new(CorrelationStore::new()),
        NotificationFactory::new(queue.clone(), render.clone(), config.servers.clone()),
        render,
        Arc::new(FsWorkspaceReader),
        config.features.clone(),
    );

    let stdin = std::io::stdin();
    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        match serde_json::from_str::<Step>(&line) {
            Ok(step) => apply(&coordinator, &catalog, step)?,
            Err(e) => warn!(line = number + 1, error = %e, "Skipping malformed step"),
        }
    }

    let pending = coordinator.report();
    if !pending.is_empty() {
        info!(events = pending.events.len(), "Events still waiting for builds at exit");
    }

    wait_for_queues(&queue, &config.servers, config.dispatch.shutdown_timeout_secs).await;
    queue.shutdown(ShutdownMode::Graceful).await;
    info!("tally stopped");
    Ok(())
}
