//! Correlation of review events with the builds they trigger

pub mod imprint;
pub mod report;
pub mod store;

pub use imprint::{BuildsStartedStats, Entry, EventImprint, PriorBuild};
pub use report::{ImprintReport, MemoryReport, TriggerContext};
pub use store::CorrelationStore;
