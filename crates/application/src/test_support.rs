//! Fixtures shared by the unit tests of this crate

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tally_domain::{
    BuildEnvironments, Change, CommandTransport, EventKind, JobCatalog, PatchSet, ReviewEvent,
    TransportError,
};
use tally_shared::ServerName;
use tokio::sync::mpsc;

use crate::render::RenderContext;

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
            revision: "9f8e7d6c5b4a".to_string(),
            ref_spec: None,
        },
    );
    event.received_on = 1_700_000_000_000;
    event
}

pub fn render_context() -> RenderContext {
    RenderContext::new(
        Arc::new(JobCatalog::new()),
        Arc::new(BuildEnvironments::new(HashMap::new())),
    )
}

/// Forwards every sent command to a channel the test awaits on
pub struct RecordingTransport {
    sent: mpsc::UnboundedSender<(ServerName, String)>,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ServerName, String)>) {
        let (sent, rx) = mpsc::unbounded_channel();
        (Self { sent }, rx)
    }
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn send_command(&self, server: &ServerName, command: &str) -> Result<(), TransportError> {
        let _ = self.sent.send((server.clone(), command.to_string()));
        Ok(())
    }
}
