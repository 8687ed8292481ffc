//! Per-job feedback policy
//!
//! A policy holds everything a job configures about the feedback it
//! contributes: vote overrides, skip-vote flags, custom messages and URLs.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_shared::config::VoteTable;
use tally_shared::{BuildResult, JobName, NotifyLevel, Verdict};

/// Result categories for which a job's vote is left out of the aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipVote {
    #[serde(default)]
    pub on_successful: bool,
    #[serde(default)]
    pub on_failed: bool,
    #[serde(default)]
    pub on_unstable: bool,
    #[serde(default)]
    pub on_not_built: bool,
    #[serde(default)]
    pub on_aborted: bool,
}

impl SkipVote {
    pub fn skips(&self, result: BuildResult) -> bool {
        match result {
            BuildResult::Success => self.on_successful,
            BuildResult::Failure => self.on_failed,
            BuildResult::Unstable => self.on_unstable,
            BuildResult::NotBuilt => self.on_not_built,
            BuildResult::Aborted => self.on_aborted,
        }
    }
}

/// Custom feedback text, one per result plus the build-start message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessages {
    #[serde(default)]
    pub build_start: Option<String>,
    #[serde(default)]
    pub successful: Option<String>,
    #[serde(default)]
    pub failed: Option<String>,
    #[serde(default)]
    pub unstable: Option<String>,
    #[serde(default)]
    pub not_built: Option<String>,
    #[serde(default)]
    pub aborted: Option<String>,
}

impl BuildMessages {
    /// Non-empty custom message for a result
    pub fn for_result(&self, result: BuildResult) -> Option<&str> {
        let message = match Verdict::of(result) {
            Verdict::Successful => &self.successful,
            Verdict::Failed => &self.failed,
            Verdict::Unstable => &self.unstable,
            Verdict::NotBuilt => &self.not_built,
            Verdict::Aborted => &self.aborted,
        };
        message.as_deref().filter(|m| !m.is_empty())
    }

    pub fn build_start(&self) -> Option<&str> {
        self.build_start.as_deref().filter(|m| !m.is_empty())
    }
}

/// Feedback policy of one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPolicy {
    /// Vote overrides; unset values fall back to the server defaults
    #[serde(default)]
    pub votes: VoteTable,
    #[serde(default)]
    pub skip_vote: SkipVote,
    /// Overrides the server's notification level
    #[serde(default)]
    pub notification_level: Option<NotifyLevel>,
    /// URL shown instead of the build URL, may contain `$VARS`
    #[serde(default)]
    pub custom_url: Option<String>,
    #[serde(default)]
    pub messages: BuildMessages,
    /// Builds of this job send no feedback at all
    #[serde(default)]
    pub silent_mode: bool,
    /// Builds of this job send no "started" feedback
    #[serde(default)]
    pub silent_start_mode: bool,
    /// Workspace glob of a file whose content explains an unsuccessful build
    #[serde(default)]
    pub unsuccessful_filepath: Option<String>,
    /// Hold the aggregate feedback until released externally
    #[serde(default)]
    pub delayed_approval: bool,
}

impl JobPolicy {
    pub fn custom_url(&self) -> Option<&str> {
        self.custom_url.as_deref().filter(|u| !u.is_empty())
    }

    pub fn unsuccessful_filepath(&self) -> Option<&str> {
        self.unsuccessful_filepath.as_deref().filter(|p| !p.is_empty())
    }
}

/// Lookup of job policies by job name
///
/// `None` means the job is unknown, e.g. deleted while its build ran.
pub trait JobPolicyLookup: Send + Sync {
    fn policy(&self, job: &JobName) -> Option<Arc<JobPolicy>>;
}

// ============================================================================
// Implementation: JobCatalog
// ============================================================================

/// In-memory policy registry
#[derive(Debug, Default)]
pub struct JobCatalog {
    policies: DashMap<JobName, Arc<JobPolicy>>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: impl Into<JobName>, policy: JobPolicy) {
        self.policies.insert(job.into(), Arc::new(policy));
    }

    pub fn remove(&self, job: &JobName) -> Option<Arc<JobPolicy>> {
        self.policies.remove(job).map(|(_, policy)| policy)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl JobPolicyLookup for JobCatalog {
    fn policy(&self, job: &JobName) -> Option<Arc<JobPolicy>> {
        self.policies.get(job).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BuildResult::Success, true)]
    #[case(BuildResult::Failure, false)]
    #[case(BuildResult::Unstable, true)]
    #[case(BuildResult::NotBuilt, false)]
    #[case(BuildResult::Aborted, false)]
    fn test_skip_vote_per_result(#[case] result: BuildResult, #[case] expected: bool) {
        let skip = SkipVote {
            on_successful: true,
            on_unstable: true,
            ..SkipVote::default()
        };
        assert_eq!(skip.skips(result), expected);
    }

    #[test]
    fn test_empty_custom_message_counts_as_unset() {
        let messages = BuildMessages {
            failed: Some(String::new()),
            successful: Some("All good".to_string()),
            ..BuildMessages::default()
        };
        assert_eq!(messages.for_result(BuildResult::Failure), None);
        assert_eq!(messages.for_result(BuildResult::Success), Some("All good"));
    }

    #[test]
    fn test_catalog_register_and_remove() {
        let catalog = JobCatalog::new();
        catalog.register(
            "verify",
            JobPolicy {
                delayed_approval: true,
                ..JobPolicy::default()
            },
        );

        let job = JobName::from("verify");
        assert!(catalog.policy(&job).is_some_and(|p| p.delayed_approval));
        assert!(catalog.remove(&job).is_some());
        assert!(catalog.policy(&job).is_none());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: JobPolicy = serde_json::from_str(
            r#"{"votes": {"successful": {"verified": null, "code_review": 2}}, "silent_start_mode": true}"#,
        )
        .unwrap();
        assert_eq!(policy.votes.successful.code_review, Some(2));
        assert_eq!(policy.votes.failed.verified, None);
        assert!(policy.silent_start_mode);
        assert!(!policy.skip_vote.on_failed);
    }
}
