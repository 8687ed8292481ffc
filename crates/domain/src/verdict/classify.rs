//! Outcome classification over an imprint's reportable entries

use tally_shared::{BuildResult, Verdict};

use crate::jobs::JobPolicyLookup;
use crate::memory::{Entry, EventImprint};

/// Outcome of an event and whether not-built entries are left out of voting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    /// False only when every entry was not built
    pub only_count_built: bool,
}

fn is_skipped(policies: &dyn JobPolicyLookup, entry: &Entry, result: BuildResult) -> bool {
    policies
        .policy(&entry.job)
        .is_some_and(|p| p.skip_vote.skips(result))
}

/// First match wins: all successful, any failed, any unstable, all not
/// built, any aborted, otherwise failed.
pub fn classify(imprint: &EventImprint, policies: &dyn JobPolicyLookup) -> Classification {
    let entries: Vec<&Entry> = imprint.reportable_entries().collect();
    let results: Vec<Option<BuildResult>> = entries.iter().map(|e| e.result()).collect();

    let any = |wanted: BuildResult| results.iter().any(|r| *r == Some(wanted));

    let verdict = if were_all_successful(&entries, policies) {
        Verdict::Successful
    } else if any(BuildResult::Failure) {
        Verdict::Failed
    } else if any(BuildResult::Unstable) {
        Verdict::Unstable
    } else if were_all_not_built(&entries) {
        return Classification {
            verdict: Verdict::NotBuilt,
            only_count_built: false,
        };
    } else if any(BuildResult::Aborted) {
        Verdict::Aborted
    } else {
        Verdict::Failed
    };

    Classification {
        verdict,
        only_count_built: true,
    }
}

/// When every vote is skipped the results must literally be successes;
/// otherwise a skipped non-success still counts as successful.
fn were_all_successful(entries: &[&Entry], policies: &dyn JobPolicyLookup) -> bool {
    let all_skipped = entries.iter().all(|e| {
        e.result()
            .is_some_and(|result| is_skipped(policies, e, result))
    });

    entries.iter().all(|e| match e.result() {
        Some(BuildResult::Success) => true,
        Some(result) => !all_skipped && is_skipped(policies, e, result),
        None => false,
    })
}

fn were_all_not_built(entries: &[&Entry]) -> bool {
    entries
        .iter()
        .filter(|e| !e.is_cancelled())
        .all(|e| e.result() == Some(BuildResult::NotBuilt))
}
