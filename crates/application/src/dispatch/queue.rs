//! Dispatch Queue
//!
//! One bounded queue per review server, drained by that server's sending
//! workers. Enqueueing never waits: a full queue is reported to the caller.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tally_domain::{CommandTransport, FeedbackObserver};
use tally_shared::ServerName;
use tally_shared::config::{DispatchConfig, ServerConfig};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::command::FeedbackCommand;
use crate::error::DispatchError;
use crate::render::RenderContext;

/// How pending commands are treated on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let in-flight sends finish, drop queued commands
    Graceful,
    /// Abort workers right away
    Immediate,
}

struct ServerQueue {
    sender: mpsc::Sender<FeedbackCommand>,
    pending: Arc<AtomicUsize>,
}

struct Running {
    queues: HashMap<ServerName, ServerQueue>,
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Everything a sending worker needs
struct WorkerContext {
    server: ServerConfig,
    transport: Arc<dyn CommandTransport>,
    render: Arc<RenderContext>,
    observers: Arc<RwLock<Vec<Arc<dyn FeedbackObserver>>>>,
    pending: Arc<AtomicUsize>,
}

pub struct DispatchQueue {
    config: DispatchConfig,
    servers: Vec<ServerConfig>,
    transport: Arc<dyn CommandTransport>,
    render: Arc<RenderContext>,
    observers: Arc<RwLock<Vec<Arc<dyn FeedbackObserver>>>>,
    running: Mutex<Option<Running>>,
    is_running: AtomicBool,
    stopped: AtomicBool,
}

impl DispatchQueue {
    pub fn new(
        config: DispatchConfig,
        servers: Vec<ServerConfig>,
        transport: Arc<dyn CommandTransport>,
        render: Arc<RenderContext>,
    ) -> Self {
        Self {
            config,
            servers,
            transport,
            render,
            observers: Arc::new(RwLock::new(Vec::new())),
            running: Mutex::new(None),
            is_running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn FeedbackObserver>) {
        self.observers.write().push(observer);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Spawn the sending workers. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(DispatchError::AlreadyStarted);
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut queues = HashMap::new();
        let mut workers = Vec::new();

        for server in &self.servers {
            let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
            let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
            let pending = Arc::new(AtomicUsize::new(0));
            let context = Arc::new(WorkerContext {
                server: server.clone(),
                transport: Arc::clone(&self.transport),
                render: Arc::clone(&self.render),
                observers: Arc::clone(&self.observers),
                pending: Arc::clone(&pending),
            });

            for worker in 0..server.sending_worker_threads.max(1) {
                workers.push(tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&context),
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                )));
            }

            info!(
                server = %server.name,
                workers = server.sending_worker_threads.max(1),
                capacity = self.config.queue_capacity,
                "Started dispatch queue"
            );
            queues.insert(server.name.clone(), ServerQueue { sender, pending });
        }

        *running = Some(Running {
            queues,
            workers,
            shutdown_tx,
        });
        self.is_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Queue a command for `server` without waiting
    pub fn enqueue(&self, server: &ServerName, command: FeedbackCommand) -> Result<(), DispatchError> {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            return Err(if self.stopped.load(Ordering::SeqCst) {
                DispatchError::ShutDown
            } else {
                DispatchError::NotStarted
            });
        };
        let queue = running
            .queues
            .get(server)
            .ok_or_else(|| DispatchError::UnknownServer {
                server: server.clone(),
            })?;

        // Counted before the send so a worker's decrement never runs first
        let previous = queue.pending.fetch_add(1, Ordering::SeqCst);
        match queue.sender.try_send(command) {
            Ok(()) => {
                let pending = previous.saturating_add(1);
                if pending >= self.config.warning_threshold {
                    warn!(
                        server = %server,
                        pending,
                        "Dispatch queue is growing, review server may be slow or unreachable"
                    );
                }
                Ok(())
            }
            Err(e) => {
                queue.pending.fetch_sub(1, Ordering::SeqCst);
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(DispatchError::QueueFull {
                        server: server.clone(),
                        capacity: self.config.queue_capacity,
                    }),
                    mpsc::error::TrySendError::Closed(_) => Err(DispatchError::ShutDown),
                }
            }
        }
    }

    /// Commands waiting for a worker on `server`
    pub fn pending(&self, server: &ServerName) -> usize {
        self.running
            .lock()
            .as_ref()
            .and_then(|r| r.queues.get(server))
            .map(|q| q.pending.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Stop the workers. Safe to call more than once.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        self.is_running.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);

        let dropped: usize = running
            .queues
            .values()
            .map(|q| q.pending.load(Ordering::SeqCst))
            .sum();

        match mode {
            ShutdownMode::Immediate => {
                for worker in &running.workers {
                    worker.abort();
                }
                info!(dropped, "Dispatch queue stopped immediately");
            }
            ShutdownMode::Graceful => {
                let _ = running.shutdown_tx.send(true);
                let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
                let abort_handles: Vec<_> = running.workers.iter().map(|w| w.abort_handle()).collect();
                let join_all = async {
                    for worker in running.workers {
                        if let Err(e) = worker.await {
                            if !e.is_cancelled() {
                                error!(error = %e, "Dispatch worker panicked");
                            }
                        }
                    }
                };
                if tokio::time::timeout(timeout, join_all).await.is_err() {
                    warn!(
                        timeout_secs = self.config.shutdown_timeout_secs,
                        "Dispatch workers did not finish in time, aborting"
                    );
                    for handle in abort_handles {
                        handle.abort();
                    }
                }
                info!(dropped, "Dispatch queue shut down");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    context: Arc<WorkerContext>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<FeedbackCommand>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(server = %context.server.name, worker, "Dispatch worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                command = receiver.recv() => command,
            }
        };
        let Some(command) = next else {
            break;
        };
        context.pending.fetch_sub(1, Ordering::SeqCst);

        deliver(&context, command).await;
    }
    debug!(server = %context.server.name, worker, "Dispatch worker stopped");
}

async fn deliver(context: &WorkerContext, command: FeedbackCommand) {
    let server = &context.server.name;
    let event = command.event().key();

    let text = match command.render(&context.server, &context.render) {
        Ok(text) => text,
        Err(e) => {
            warn!(server = %server, event = %event, error = %e, "Could not render feedback, skipping");
            return;
        }
    };

    match context.transport.send_command(server, &text).await {
        Ok(()) => {
            debug!(server = %server, event = %event, kind = ?command.kind(), "Feedback sent");
            let observers = context.observers.read().clone();
            for observer in observers {
                observer.feedback_sent(server, command.kind(), &text);
            }
        }
        Err(e) => {
            error!(server = %server, event = %event, error = %e, "Failed to send feedback");
        }
    }
}
