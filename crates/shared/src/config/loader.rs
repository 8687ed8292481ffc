//! Configuration loader
//!
//! Loads configuration from an optional `.env` file followed by the process
//! environment.

use std::path::Path;
use std::str::FromStr;

use super::dto::{
    CommandTemplates, DispatchConfig, FeatureFlags, LoggingConfig, ScorePair, ServerConfig,
    TallyConfigDto, VoteTable, normalize_url,
};
use super::error::{ConfigError, Result};
use super::validator::validate_config;
use crate::ids::ServerName;
use crate::states::{NotifyLevel, Verdict};

/// Configuration loader
///
/// Values from the `.env` file are exported into the environment before the
/// environment is read, so they take part in the same lookup.
///
/// # Example
///
/// ```
/// use tally_shared::config::ConfigLoader;
///
/// let loader = ConfigLoader::new(None);
/// let config = loader.load().expect("defaults are valid");
/// assert!(!config.servers.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Optional path to .env file
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the full configuration
    pub fn load(&self) -> Result<TallyConfigDto> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = TallyConfigDto::from_env()?;
        validate_config(&config)?;

        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

// ============================================================================
// Implementation: TallyConfigDto::from_env
// ============================================================================

impl TallyConfigDto {
    /// Build the configuration from environment variables
    ///
    /// # Variables
    ///
    /// - `TALLY_SERVERS`: comma-separated server names (default: "default")
    /// - `TALLY_SERVER_<NAME>_URL`, `_WORKERS`, `_NOTIFY`, `_PLUGIN_MESSAGES`
    /// - `TALLY_VOTE_<OUTCOME>_<AXIS>`: e.g. `TALLY_VOTE_FAILED_VERIFIED=-1`,
    ///   `null` disables the vote
    /// - `TALLY_CMD_<OUTCOME>`: command template override
    /// - `TALLY_DISPATCH_CAPACITY`, `TALLY_DISPATCH_WARN_THRESHOLD`,
    ///   `TALLY_DISPATCH_SHUTDOWN_SECS`
    /// - `TALLY_DELAYED_APPROVAL`: "1"/"0" (default: 1)
    /// - `RUST_LOG`, `TALLY_LOG_FORMAT`
    pub fn from_env() -> Result<Self> {
        let votes = vote_table_from_env()?;
        let templates = templates_from_env();

        let names = std::env::var("TALLY_SERVERS").unwrap_or_else(|_| "default".to_string());
        let servers = names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| ServerConfig::from_env(name, &votes, &templates))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            servers,
            dispatch: DispatchConfig::from_env()?,
            features: FeatureFlags::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    /// Build one server's configuration; `votes` and `templates` are the
    /// process-wide values already read from the environment.
    pub fn from_env(name: &str, votes: &VoteTable, templates: &CommandTemplates) -> Result<Self> {
        let prefix = format!("TALLY_SERVER_{}", env_segment(name));
        let defaults = ServerConfig::default();

        let front_end_url = std::env::var(format!("{}_URL", prefix))
            .map(normalize_url)
            .unwrap_or(defaults.front_end_url);

        let sending_worker_threads = parse_optional_var(
            &format!("{}_WORKERS", prefix),
            defaults.sending_worker_threads,
        )?;

        let notification_level = parse_optional_var::<NotifyLevel>(
            &format!("{}_NOTIFY", prefix),
            defaults.notification_level,
        )?;

        let enable_plugin_messages = parse_flag(
            &format!("{}_PLUGIN_MESSAGES", prefix),
            defaults.enable_plugin_messages,
        )?;

        Ok(Self {
            name: ServerName::new(name),
            front_end_url,
            votes: votes.clone(),
            templates: templates.clone(),
            notification_level,
            enable_plugin_messages,
            sending_worker_threads,
        })
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = DispatchConfig::default();
        Ok(Self {
            queue_capacity: parse_optional_var("TALLY_DISPATCH_CAPACITY", defaults.queue_capacity)?,
            warning_threshold: parse_optional_var(
                "TALLY_DISPATCH_WARN_THRESHOLD",
                defaults.warning_threshold,
            )?,
            shutdown_timeout_secs: parse_optional_var(
                "TALLY_DISPATCH_SHUTDOWN_SECS",
                defaults.shutdown_timeout_secs,
            )?,
        })
    }
}

impl FeatureFlags {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            delayed_approval_enabled: parse_flag("TALLY_DELAYED_APPROVAL", true)?,
        })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let json = match std::env::var("TALLY_LOG_FORMAT") {
            Ok(format) => match format.to_ascii_lowercase().as_str() {
                "json" => true,
                "text" | "pretty" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "TALLY_LOG_FORMAT".to_string(),
                        value: format,
                    });
                }
            },
            Err(_) => false,
        };
        Ok(Self { level, json })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const OUTCOMES: [(&str, Option<Verdict>); 6] = [
    ("STARTED", None),
    ("SUCCESSFUL", Some(Verdict::Successful)),
    ("FAILED", Some(Verdict::Failed)),
    ("UNSTABLE", Some(Verdict::Unstable)),
    ("NOT_BUILT", Some(Verdict::NotBuilt)),
    ("ABORTED", Some(Verdict::Aborted)),
];

fn vote_table_from_env() -> Result<VoteTable> {
    let mut table = VoteTable::server_defaults();
    for (outcome, verdict) in OUTCOMES {
        let pair: &mut ScorePair = match verdict {
            Some(v) => table.for_verdict_mut(v),
            None => &mut table.started,
        };
        if let Some(value) = parse_vote(&format!("TALLY_VOTE_{}_VERIFIED", outcome))? {
            pair.verified = value;
        }
        if let Some(value) = parse_vote(&format!("TALLY_VOTE_{}_CODE_REVIEW", outcome))? {
            pair.code_review = value;
        }
    }
    Ok(table)
}

fn templates_from_env() -> CommandTemplates {
    let mut templates = CommandTemplates::default();
    for (outcome, verdict) in OUTCOMES {
        if let Ok(command) = std::env::var(format!("TALLY_CMD_{}", outcome)) {
            let slot = match verdict {
                None => &mut templates.started,
                Some(Verdict::Successful) => &mut templates.successful,
                Some(Verdict::Failed) => &mut templates.failed,
                Some(Verdict::Unstable) => &mut templates.unstable,
                Some(Verdict::NotBuilt) => &mut templates.not_built,
                Some(Verdict::Aborted) => &mut templates.aborted,
            };
            *slot = command;
        }
    }
    templates
}

/// Outer `None`: variable unset. Inner `None`: explicitly disabled.
fn parse_vote(var: &str) -> Result<Option<Option<i32>>> {
    match std::env::var(var) {
        Err(_) => Ok(None),
        Ok(raw) => {
            let raw = raw.trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                return Ok(Some(None));
            }
            raw.parse::<i32>()
                .map(|v| Some(Some(v)))
                .map_err(|_| ConfigError::InvalidValue {
                    var: var.to_string(),
                    value: raw.to_string(),
                })
        }
    }
}

/// Parse an optional environment variable, failing on malformed values
fn parse_optional_var<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(var: &str, default: bool) -> Result<bool> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: "must be 0 or 1".to_string(),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Environment-variable segment for a server name ("review-eu" -> "REVIEW_EU")
fn env_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
