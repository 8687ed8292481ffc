//! Review events
//!
//! An event is one occurrence raised by a review server. Events are immutable
//! values; two deliveries of the same occurrence produce equal [`EventKey`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::{EventKey, ServerName};

/// Kind of occurrence reported by the review server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PatchsetCreated,
    DraftPublished,
    CommentAdded,
    ChangeMerged,
    ChangeAbandoned,
    ChangeRestored,
    RefUpdated,
    TopicChanged,
    HashtagsChanged,
    WipStateChanged,
    PrivateStateChanged,
    /// Triggered by hand for an existing patch set
    Manual,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PatchsetCreated => "patchset-created",
            EventKind::DraftPublished => "draft-published",
            EventKind::CommentAdded => "comment-added",
            EventKind::ChangeMerged => "change-merged",
            EventKind::ChangeAbandoned => "change-abandoned",
            EventKind::ChangeRestored => "change-restored",
            EventKind::RefUpdated => "ref-updated",
            EventKind::TopicChanged => "topic-changed",
            EventKind::HashtagsChanged => "hashtags-changed",
            EventKind::WipStateChanged => "wip-state-changed",
            EventKind::PrivateStateChanged => "private-state-changed",
            EventKind::Manual => "manual",
        }
    }

    /// Whether feedback for this kind carries votes
    pub fn is_scorable(&self) -> bool {
        matches!(
            self,
            EventKind::PatchsetCreated
                | EventKind::DraftPublished
                | EventKind::CommentAdded
                | EventKind::Manual
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The change a change-based event refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Repository name on the review server
    pub project: String,
    pub branch: String,
    /// Change-Id footer value
    pub id: String,
    pub number: u64,
    #[serde(default)]
    pub topic: Option<String>,
}

/// One revision of a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub number: u32,
    pub revision: String,
    /// Ref the revision can be fetched from, when the server reported it
    #[serde(default, rename = "ref")]
    pub ref_spec: Option<String>,
}

/// One event delivered by a review server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub kind: EventKind,
    /// Server the event came from and feedback goes back to
    #[serde(default)]
    pub provider: ServerName,
    #[serde(default)]
    pub change: Option<Change>,
    #[serde(default)]
    pub patch_set: Option<PatchSet>,
    /// Updated ref for ref-updated events
    #[serde(default)]
    pub ref_name: Option<String>,
    /// Server-side reception time in milliseconds, part of the identity
    #[serde(default)]
    pub received_on: i64,
}

impl ReviewEvent {
    /// Change-based event for a patch set
    pub fn for_patch_set(
        kind: EventKind,
        provider: impl Into<String>,
        change: Change,
        patch_set: PatchSet,
    ) -> Self {
        Self {
            kind,
            provider: ServerName::new(provider),
            change: Some(change),
            patch_set: Some(patch_set),
            ref_name: None,
            received_on: Utc::now().timestamp_millis(),
        }
    }

    /// Ref-updated event, which has no change
    pub fn ref_updated(provider: impl Into<String>, ref_name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::RefUpdated,
            provider: ServerName::new(provider),
            change: None,
            patch_set: None,
            ref_name: Some(ref_name.into()),
            received_on: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_received_on(mut self, at: DateTime<Utc>) -> Self {
        self.received_on = at.timestamp_millis();
        self
    }

    /// Identity of this occurrence
    pub fn key(&self) -> EventKey {
        let change = self
            .change
            .as_ref()
            .map(|c| c.number.to_string())
            .or_else(|| self.ref_name.clone())
            .unwrap_or_else(|| "-".to_string());
        let patch_set = self
            .patch_set
            .as_ref()
            .map(|p| p.number.to_string())
            .unwrap_or_else(|| "-".to_string());
        EventKey(format!(
            "{}/{}/{}/{}/{}",
            self.provider, self.kind, change, patch_set, self.received_on
        ))
    }

    pub fn has_change(&self) -> bool {
        self.change.is_some()
    }

    /// Scorable events carry a reviewable change and take part in voting
    pub fn is_scorable(&self) -> bool {
        self.has_change() && self.kind.is_scorable()
    }

    /// Ref the patch set can be fetched from
    ///
    /// Falls back to `refs/changes/<NN>/<change>/<patchset>` where `NN` is
    /// the last two digits of the change number.
    pub fn ref_spec(&self) -> Option<String> {
        let change = self.change.as_ref()?;
        let patch_set = self.patch_set.as_ref()?;
        if let Some(ref_spec) = patch_set.ref_spec.as_ref().filter(|r| !r.is_empty()) {
            return Some(ref_spec.clone());
        }
        Some(format!(
            "refs/changes/{:02}/{}/{}",
            change.number % 100,
            change.number,
            patch_set.number
        ))
    }
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.change, &self.patch_set) {
            (Some(change), Some(patch_set)) => write!(
                f,
                "{} {},{} ({})",
                self.kind, change.number, patch_set.number, self.provider
            ),
            (Some(change), None) => write!(f, "{} {} ({})", self.kind, change.number, self.provider),
            _ => write!(
                f,
                "{} {} ({})",
                self.kind,
                self.ref_name.as_deref().unwrap_or("-"),
                self.provider
            ),
        }
    }
}
