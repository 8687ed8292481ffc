//! Asynchronous delivery of feedback commands to review servers

pub mod command;
pub mod queue;

pub use command::FeedbackCommand;
pub use queue::{DispatchQueue, ShutdownMode};
