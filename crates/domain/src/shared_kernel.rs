// Shared Kernel - errors shared by the domain modules

use tally_shared::{EventKey, JobName};

/// Domain errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown event: {key}")]
    UnknownEvent { key: EventKey },

    #[error("Job {job} is not registered for event {key}")]
    UnknownJob { key: EventKey, job: JobName },

    #[error("Event {key} carries no change to report on")]
    NoChange { key: EventKey },

    #[error("Environment expansion failed for {job}: {message}")]
    ExpansionFailed { job: JobName, message: String },

    #[error("Command rendering failed: {message}")]
    RenderFailed { message: String },

    #[error("Workspace error: {message}")]
    Workspace { message: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
