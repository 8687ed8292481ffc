//! Application errors

use tally_domain::DomainError;
use tally_shared::ServerName;

/// Errors raised by the dispatch queue to its callers
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch queue has not been started")]
    NotStarted,

    #[error("Dispatch queue is already running")]
    AlreadyStarted,

    #[error("No review server configured with name {server}")]
    UnknownServer { server: ServerName },

    #[error("Dispatch queue for {server} is full ({capacity} pending)")]
    QueueFull { server: ServerName, capacity: usize },

    #[error("Dispatch queue is shutting down")]
    ShutDown,
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type Result<T> = std::result::Result<T, ApplicationError>;
