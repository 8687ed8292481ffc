//! Command rendering
//!
//! Templates carry `<MARKER>` placeholders. A template is first expanded with
//! the build environment, then markers are substituted, then vote flags
//! without a value are stripped.

use std::collections::BTreeMap;
use std::sync::Arc;

use tally_shared::config::ServerConfig;
use tally_shared::{BuildResult, NotifyLevel, ScoreAxis, Verdict};
use tracing::trace;

use super::classify::{Classification, classify};
use super::votes::{highest_notification_level, minimum_vote, resolve_started_vote};
use crate::events::ReviewEvent;
use crate::jobs::{BuildRef, JobPolicy, JobPolicyLookup};
use crate::memory::{BuildsStartedStats, Entry, EventImprint};
use crate::ports::{EnvironmentExpander, MessageProvider};
use crate::shared_kernel::{DomainError, Result};

/// Separates a build URL from its result in the builds summary
pub const MESSAGE_DELIMITER: &str = " : ";

const MESSAGE_START: &str = "--message '";
const MESSAGE_END: &str = "' --";

type Parameters = BTreeMap<&'static str, String>;

/// Aggregate verdict of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub verdict: Verdict,
    pub only_count_built: bool,
    pub verified: Option<i32>,
    pub code_review: Option<i32>,
    pub notification_level: NotifyLevel,
}

pub struct ParameterExpander<'a> {
    server: &'a ServerConfig,
    policies: &'a dyn JobPolicyLookup,
    environment: &'a dyn EnvironmentExpander,
    providers: &'a [Arc<dyn MessageProvider>],
}

impl<'a> ParameterExpander<'a> {
    pub fn new(
        server: &'a ServerConfig,
        policies: &'a dyn JobPolicyLookup,
        environment: &'a dyn EnvironmentExpander,
        providers: &'a [Arc<dyn MessageProvider>],
    ) -> Self {
        Self {
            server,
            policies,
            environment,
            providers,
        }
    }

    /// `<root>job/<name>/<number>/`, one `job/` segment per folder level
    pub fn build_url(&self, build: &BuildRef) -> String {
        let mut url = self.server.front_end_url.clone();
        for segment in build.job.as_str().split('/') {
            url.push_str("job/");
            url.push_str(segment);
            url.push('/');
        }
        if let Some(number) = build.number {
            url.push_str(&number.to_string());
            url.push('/');
        }
        url
    }

    /// Verdict, votes and notification level for a resolved imprint.
    ///
    /// Events that cannot be scored get no votes and notify everyone.
    pub fn aggregate(&self, imprint: &EventImprint) -> Aggregate {
        let Classification {
            verdict,
            only_count_built,
        } = classify(imprint, self.policies);

        let (verified, code_review, notification_level) = if imprint.event().is_scorable() {
            let votes = &self.server.votes;
            (
                minimum_vote(imprint, self.policies, votes, ScoreAxis::Verified, only_count_built),
                minimum_vote(imprint, self.policies, votes, ScoreAxis::CodeReview, only_count_built),
                highest_notification_level(
                    imprint,
                    self.policies,
                    self.server.notification_level,
                    only_count_built,
                ),
            )
        } else {
            (None, None, NotifyLevel::All)
        };

        Aggregate {
            verdict,
            only_count_built,
            verified,
            code_review,
            notification_level,
        }
    }

    /// Command announcing that `build` started
    pub fn build_started_command(
        &self,
        build: &BuildRef,
        event: &ReviewEvent,
        stats: &BuildsStartedStats,
    ) -> Result<String> {
        if !event.has_change() {
            return Err(DomainError::NoChange { key: event.key() });
        }

        let policy = self.policies.policy(&build.job);
        let votes = &self.server.votes;
        let mut parameters = self.standard_parameters(
            event,
            Some(build),
            resolve_started_vote(policy.as_deref(), votes, ScoreAxis::Verified),
            resolve_started_vote(policy.as_deref(), votes, ScoreAxis::CodeReview),
            NotifyLevel::All,
        );

        let mut started_stats = String::new();
        if stats.total > 1 {
            started_stats.push_str(&stats.to_string());
        }
        if let Some(message) = policy.as_deref().and_then(|p| p.messages.build_start()) {
            started_stats.push_str("\n\n");
            started_stats.push_str(&self.expand(message, Some(build), &parameters)?);
        }
        if self.server.enable_plugin_messages {
            for provider in self.providers {
                if let Some(message) = provider.build_started_message(build) {
                    started_stats.push_str("\n\n");
                    started_stats.push_str(&message);
                }
            }
        }
        parameters.insert("STARTED_STATS", started_stats);

        self.expand(&self.server.templates.started, Some(build), &parameters)
    }

    /// Aggregate command for a fully resolved imprint
    pub fn build_completed_command(&self, imprint: &EventImprint) -> Result<String> {
        let event = imprint.event();
        if !event.has_change() {
            return Err(DomainError::NoChange { key: event.key() });
        }

        let aggregate = self.aggregate(imprint);
        let template = self.server.templates.for_verdict(aggregate.verdict);

        let mut parameters = self.standard_parameters(
            event,
            None,
            aggregate.verified,
            aggregate.code_review,
            aggregate.notification_level,
        );
        let stats = self.builds_stats(imprint, &parameters)?;
        parameters.insert("BUILDS_STATS", stats.replace('\'', "'\"'\"'"));

        let first_build = imprint.entries().first().and_then(Entry::build_ref);
        self.expand(template, first_build.as_ref(), &parameters)
    }

    fn standard_parameters(
        &self,
        event: &ReviewEvent,
        build: Option<&BuildRef>,
        verified: Option<i32>,
        code_review: Option<i32>,
        notification_level: NotifyLevel,
    ) -> Parameters {
        let mut parameters = Parameters::new();
        if let Some(change) = &event.change {
            parameters.insert("GERRIT_NAME", change.project.clone());
            parameters.insert("CHANGE_ID", change.id.clone());
            parameters.insert("BRANCH", change.branch.clone());
            if let Some(topic) = &change.topic {
                parameters.insert("TOPIC", topic.clone());
            }
            parameters.insert("CHANGE", change.number.to_string());
            if let Some(patch_set) = &event.patch_set {
                parameters.insert("PATCHSET", patch_set.number.to_string());
                parameters.insert("PATCHSET_REVISION", patch_set.revision.clone());
                if let Some(ref_spec) = event.ref_spec() {
                    parameters.insert("REFSPEC", ref_spec);
                }
            }
        }
        if let Some(build) = build {
            parameters.insert("BUILDURL", self.build_url(build));
        }
        parameters.insert("VERIFIED", vote_text(verified));
        parameters.insert("CODE_REVIEW", vote_text(code_review));
        parameters.insert("NOTIFICATION_LEVEL", notification_level.to_string());
        parameters
    }

    /// One paragraph per build, worst result first
    fn builds_stats(&self, imprint: &EventImprint, parameters: &Parameters) -> Result<String> {
        let mut builds: Vec<(&Entry, BuildRef, BuildResult)> = imprint
            .reportable_entries()
            .filter_map(|entry| {
                let build = entry.build_ref()?;
                let result = entry.result().unwrap_or(BuildResult::NotBuilt);
                Some((entry, build, result))
            })
            .collect();
        builds.sort_by(|a, b| b.2.ordinal().cmp(&a.2.ordinal()));

        let mut out = String::new();
        for (entry, build, result) in builds {
            let policy = self.policies.policy(&entry.job).unwrap_or_default();
            out.push_str("\n\n");
            out.push_str(&self.feedback_url(entry, &build, &policy, parameters)?);
            out.push_str(MESSAGE_DELIMITER);

            match policy.messages.for_result(result) {
                Some(message) => out.push_str(&self.expand(message, Some(&build), parameters)?),
                None => {
                    out.push_str(&result.to_string());
                    if policy.skip_vote.skips(result) {
                        out.push_str(" (skipped)");
                    }
                }
            }

            if result.is_worse_than(BuildResult::Success) {
                if let Some(message) = entry
                    .unsuccessful_message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                {
                    trace!(build = %build, "Using unsuccessful message");
                    out.push_str(" <<<\n");
                    out.push_str(message.trim());
                    out.push_str("\n>>>");
                }
            }

            if self.server.enable_plugin_messages {
                for provider in self.providers {
                    if let Some(message) = provider.build_completed_message(&build) {
                        out.push_str("\n\n");
                        out.push_str(&message);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Entry override, then job custom URL, then the build URL
    fn feedback_url(
        &self,
        entry: &Entry,
        build: &BuildRef,
        policy: &JobPolicy,
        parameters: &Parameters,
    ) -> Result<String> {
        let custom = entry
            .custom_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| policy.custom_url());
        match custom {
            Some(url) => self.expand(url, Some(build), parameters),
            None => Ok(self.build_url(build)),
        }
    }

    fn expand(&self, template: &str, build: Option<&BuildRef>, parameters: &Parameters) -> Result<String> {
        let mut command = match build {
            Some(build) => self.environment.expand(build, template)?,
            None => template.to_string(),
        };

        for (name, value) in parameters {
            command = command.replace(&format!("<{}>", name), value);
        }

        let unset = i32::MAX.to_string();
        for axis in [ScoreAxis::CodeReview, ScoreAxis::Verified] {
            command = command.replace(&format!("{} null", axis.flag()), "");
            command = command.replace(&format!("{} {}", axis.flag(), unset), "");
        }
        Ok(command)
    }
}

fn vote_text(vote: Option<i32>) -> String {
    vote.map_or_else(|| "null".to_string(), |v| v.to_string())
}

/// Text of the `--message '...'` argument of a rendered command
pub fn extract_message(command: &str) -> Option<String> {
    let start = command.find(MESSAGE_START)? + MESSAGE_START.len();
    let from_message = &command[start..];
    let end = from_message.find(MESSAGE_END).unwrap_or(from_message.len());
    Some(from_message[..end].to_string())
}
