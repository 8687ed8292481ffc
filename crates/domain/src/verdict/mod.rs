//! Verdict Aggregator: outcome classification, vote aggregation and
//! command rendering

pub mod classify;
pub mod expander;
pub mod votes;

pub use classify::{Classification, classify};
pub use expander::{Aggregate, MESSAGE_DELIMITER, ParameterExpander, extract_message};
pub use votes::{highest_notification_level, minimum_vote, resolve_started_vote, resolve_vote};
