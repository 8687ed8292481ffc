//! Queued feedback commands

use tally_domain::{BuildRef, BuildsStartedStats, FeedbackKind, ReviewEvent};
use tally_shared::config::ServerConfig;

use crate::render::RenderContext;

/// One unit of work for a dispatch worker
#[derive(Debug, Clone)]
pub enum FeedbackCommand {
    /// Rendered when a worker picks it up, once the build's environment
    /// and URL are known
    Started {
        event: ReviewEvent,
        build: BuildRef,
        stats: BuildsStartedStats,
    },
    /// Rendered when the event resolved
    Completed { event: ReviewEvent, command: String },
}

impl FeedbackCommand {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            FeedbackCommand::Started { .. } => FeedbackKind::Started,
            FeedbackCommand::Completed { .. } => FeedbackKind::Completed,
        }
    }

    pub fn event(&self) -> &ReviewEvent {
        match self {
            FeedbackCommand::Started { event, .. } | FeedbackCommand::Completed { event, .. } => {
                event
            }
        }
    }

    /// Final command text
    pub fn render(
        &self,
        server: &ServerConfig,
        context: &RenderContext,
    ) -> tally_domain::Result<String> {
        match self {
            FeedbackCommand::Started {
                event,
                build,
                stats,
            } => context
                .expander(server)
                .build_started_command(build, event, stats),
            FeedbackCommand::Completed { command, .. } => Ok(command.clone()),
        }
    }
}
