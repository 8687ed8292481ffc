//! Vote and notification-level aggregation

use tally_shared::config::VoteTable;
use tally_shared::{BuildResult, NotifyLevel, ScoreAxis, Verdict};

use crate::jobs::{JobPolicy, JobPolicyLookup};
use crate::memory::EventImprint;

/// The job's override for its own result category, else the server default
pub fn resolve_vote(
    policy: Option<&JobPolicy>,
    defaults: &VoteTable,
    result: BuildResult,
    axis: ScoreAxis,
) -> Option<i32> {
    let verdict = Verdict::of(result);
    policy
        .and_then(|p| p.votes.for_verdict(verdict).get(axis))
        .or_else(|| defaults.for_verdict(verdict).get(axis))
}

/// The job's "started" override, else the server default
pub fn resolve_started_vote(
    policy: Option<&JobPolicy>,
    defaults: &VoteTable,
    axis: ScoreAxis,
) -> Option<i32> {
    policy
        .and_then(|p| p.votes.started.get(axis))
        .or_else(|| defaults.started.get(axis))
}

/// Most restrictive vote over the contributing entries.
///
/// Entries without a result, skipped entries and (when `only_count_built`)
/// not-built entries do not contribute. `None` when nothing contributes.
pub fn minimum_vote(
    imprint: &EventImprint,
    policies: &dyn JobPolicyLookup,
    defaults: &VoteTable,
    axis: ScoreAxis,
    only_count_built: bool,
) -> Option<i32> {
    imprint
        .reportable_entries()
        .filter_map(|entry| {
            let result = entry.result()?;
            if only_count_built && result == BuildResult::NotBuilt {
                return None;
            }
            let policy = policies.policy(&entry.job);
            if policy.as_ref().is_some_and(|p| p.skip_vote.skips(result)) {
                return None;
            }
            resolve_vote(policy.as_deref(), defaults, result, axis)
        })
        .min()
}

/// Most verbose notification level over the contributing entries.
///
/// Entries of unknown jobs do not contribute; starts from `None`.
pub fn highest_notification_level(
    imprint: &EventImprint,
    policies: &dyn JobPolicyLookup,
    server_level: NotifyLevel,
    only_count_built: bool,
) -> NotifyLevel {
    imprint
        .reportable_entries()
        .filter_map(|entry| {
            let result = entry.result()?;
            if only_count_built && result == BuildResult::NotBuilt {
                return None;
            }
            let policy = policies.policy(&entry.job)?;
            if policy.skip_vote.skips(result) {
                return None;
            }
            Some(policy.notification_level.unwrap_or(server_level))
        })
        .fold(NotifyLevel::None, NotifyLevel::max)
}
