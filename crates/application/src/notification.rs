//! Turns lifecycle milestones into queued feedback commands

use std::collections::HashMap;
use std::sync::Arc;
use tally_domain::{BuildRef, BuildsStartedStats, EventImprint, ReviewEvent};
use tally_shared::ServerName;
use tally_shared::config::ServerConfig;
use tracing::debug;

use crate::dispatch::{DispatchQueue, FeedbackCommand};
use crate::error::{DispatchError, Result};
use crate::render::RenderContext;

pub struct NotificationFactory {
    queue: Arc<DispatchQueue>,
    render: Arc<RenderContext>,
    servers: HashMap<ServerName, ServerConfig>,
}

impl NotificationFactory {
    pub fn new(queue: Arc<DispatchQueue>, render: Arc<RenderContext>, servers: Vec<ServerConfig>) -> Self {
        Self {
            queue,
            render,
            servers: servers.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Queue the "started" command for `build`, rendered later by a worker
    pub fn queue_build_started(
        &self,
        event: &ReviewEvent,
        build: &BuildRef,
        stats: BuildsStartedStats,
    ) -> Result<()> {
        debug!(event = %event.key(), build = %build, stats = %stats, "Queueing build started feedback");
        self.queue.enqueue(
            &event.provider,
            FeedbackCommand::Started {
                event: event.clone(),
                build: build.clone(),
                stats,
            },
        )?;
        Ok(())
    }

    /// Render the aggregate command now, while the imprint is at hand, and
    /// queue it
    pub fn queue_build_completed(&self, imprint: &EventImprint) -> Result<()> {
        let event = imprint.event();
        let server = self
            .servers
            .get(&event.provider)
            .ok_or_else(|| DispatchError::UnknownServer {
                server: event.provider.clone(),
            })?;

        let command = self.render.expander(server).build_completed_command(imprint)?;
        debug!(event = %event.key(), "Queueing build completed feedback");
        self.queue.enqueue(
            &event.provider,
            FeedbackCommand::Completed {
                event: event.clone(),
                command,
            },
        )?;
        Ok(())
    }
}
