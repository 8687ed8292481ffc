//! Configuration Data Transfer Objects (DTOs)
//!
//! Immutable configuration handed to the coordinator, the renderer and the
//! dispatch queue at construction time.

use serde::{Deserialize, Serialize};

use crate::ids::ServerName;
use crate::states::{NotifyLevel, ScoreAxis, Verdict};

/// Tag appended to every default command so the review server can group
/// automated comments.
pub const FEEDBACK_TAG: &str = "autogenerated:tally";

/// Default number of sending workers per review server
pub const DEFAULT_SENDING_WORKER_THREADS: usize = 1;

// ============================================================================
// Top-level configuration
// ============================================================================

/// Configuration DTO for the tally process
///
/// Loaded once at startup by [`crate::config::ConfigLoader`] and passed by
/// value to every component that needs it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfigDto {
    /// Review servers feedback can be sent to
    pub servers: Vec<ServerConfig>,

    /// Dispatch queue configuration
    pub dispatch: DispatchConfig,

    /// Feature flags
    pub features: FeatureFlags,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl TallyConfigDto {
    pub fn server(&self, name: &ServerName) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| &s.name == name)
    }
}

// ============================================================================
// Votes
// ============================================================================

/// One value per score axis; `None` means "do not vote on this axis"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub verified: Option<i32>,
    pub code_review: Option<i32>,
}

impl ScorePair {
    pub const fn new(verified: i32, code_review: i32) -> Self {
        Self {
            verified: Some(verified),
            code_review: Some(code_review),
        }
    }

    pub fn get(&self, axis: ScoreAxis) -> Option<i32> {
        match axis {
            ScoreAxis::Verified => self.verified,
            ScoreAxis::CodeReview => self.code_review,
        }
    }
}

/// Vote values per outcome category.
///
/// Used both for the server-wide defaults and for per-job overrides, where
/// an unset value falls back to the server default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteTable {
    pub started: ScorePair,
    pub successful: ScorePair,
    pub failed: ScorePair,
    pub unstable: ScorePair,
    pub not_built: ScorePair,
    pub aborted: ScorePair,
}

impl VoteTable {
    /// Server-wide defaults
    pub fn server_defaults() -> Self {
        Self {
            started: ScorePair::new(0, 0),
            successful: ScorePair::new(1, 0),
            failed: ScorePair::new(-1, 0),
            unstable: ScorePair::new(0, -1),
            not_built: ScorePair::new(0, 0),
            aborted: ScorePair::new(0, 0),
        }
    }

    pub fn for_verdict(&self, verdict: Verdict) -> &ScorePair {
        match verdict {
            Verdict::Successful => &self.successful,
            Verdict::Failed => &self.failed,
            Verdict::Unstable => &self.unstable,
            Verdict::NotBuilt => &self.not_built,
            Verdict::Aborted => &self.aborted,
        }
    }

    pub fn for_verdict_mut(&mut self, verdict: Verdict) -> &mut ScorePair {
        match verdict {
            Verdict::Successful => &mut self.successful,
            Verdict::Failed => &mut self.failed,
            Verdict::Unstable => &mut self.unstable,
            Verdict::NotBuilt => &mut self.not_built,
            Verdict::Aborted => &mut self.aborted,
        }
    }
}

// ============================================================================
// Command templates
// ============================================================================

/// Command text templates, one per outcome plus the "started" command.
///
/// Templates contain `<MARKER>` placeholders substituted at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplates {
    pub started: String,
    pub successful: String,
    pub failed: String,
    pub unstable: String,
    pub not_built: String,
    pub aborted: String,
}

impl CommandTemplates {
    pub fn for_verdict(&self, verdict: Verdict) -> &str {
        match verdict {
            Verdict::Successful => &self.successful,
            Verdict::Failed => &self.failed,
            Verdict::Unstable => &self.unstable,
            Verdict::NotBuilt => &self.not_built,
            Verdict::Aborted => &self.aborted,
        }
    }

    fn review_command(message: &str) -> String {
        format!(
            "gerrit review <CHANGE>,<PATCHSET> --message '{}' \
             --verified <VERIFIED> --code-review <CODE_REVIEW> --tag {}",
            message, FEEDBACK_TAG
        )
    }
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            started: Self::review_command("Build Started <BUILDURL> <STARTED_STATS>"),
            successful: Self::review_command("Build Successful <BUILDS_STATS>"),
            failed: Self::review_command("Build Failed <BUILDS_STATS>"),
            unstable: Self::review_command("Build Unstable <BUILDS_STATS>"),
            not_built: Self::review_command("No Builds Executed <BUILDS_STATS>"),
            aborted: Self::review_command("Build Aborted <BUILDS_STATS>"),
        }
    }
}

// ============================================================================
// Servers
// ============================================================================

/// Per review-server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name events reference as their provider
    pub name: ServerName,

    /// Root URL builds are published under, always ending in `/`
    pub front_end_url: String,

    /// Default vote values
    pub votes: VoteTable,

    /// Command templates
    pub templates: CommandTemplates,

    /// Notification level used when a job does not configure one
    pub notification_level: NotifyLevel,

    /// Whether registered message providers contribute text
    pub enable_plugin_messages: bool,

    /// Number of sending workers draining this server's queue
    pub sending_worker_threads: usize,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: ServerName::new(name),
            ..Self::default()
        }
    }

    pub fn with_front_end_url(mut self, url: impl Into<String>) -> Self {
        self.front_end_url = normalize_url(url.into());
        self
    }

    pub fn with_votes(mut self, votes: VoteTable) -> Self {
        self.votes = votes;
        self
    }

    pub fn with_templates(mut self, templates: CommandTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.sending_worker_threads = workers;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: ServerName::default(),
            front_end_url: "http://localhost:8080/".to_string(),
            votes: VoteTable::server_defaults(),
            templates: CommandTemplates::default(),
            notification_level: NotifyLevel::All,
            enable_plugin_messages: true,
            sending_worker_threads: DEFAULT_SENDING_WORKER_THREADS,
        }
    }
}

/// Ensure a root URL ends with a single `/`
pub fn normalize_url(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{}/", url)
    }
}

// ============================================================================
// Dispatch, features, logging
// ============================================================================

/// Dispatch queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of pending commands per server
    pub queue_capacity: usize,

    /// Pending-command count at which a warning is logged
    pub warning_threshold: usize,

    /// How long a graceful shutdown waits for in-flight sends (seconds)
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            warning_threshold: 20,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Feature flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Hold aggregate feedback for jobs configured with delayed approval
    pub delayed_approval_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            delayed_approval_enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
