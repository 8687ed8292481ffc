// Tally - Application Layer
//
// Lifecycle coordination, feedback rendering and asynchronous dispatch on
// top of the domain model.

pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod render;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::LifecycleCoordinator;
pub use dispatch::{DispatchQueue, FeedbackCommand, ShutdownMode};
pub use error::{ApplicationError, DispatchError, Result};
pub use notification::NotificationFactory;
pub use render::RenderContext;
