//! Configuration module for tally
//!
//! Configuration is loaded once at startup, validated, and handed to the
//! coordinator and dispatch queue as immutable DTOs.
//!
//! # Usage
//!
//! ```ignore
//! use tally_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load()?;
//!
//! for server in &config.servers {
//!     println!("{} -> {}", server.name, server.front_end_url);
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TALLY_SERVERS`: comma-separated review server names (default: "default")
//! - `TALLY_SERVER_<NAME>_URL`: front-end root URL (default: "http://localhost:8080/")
//! - `TALLY_SERVER_<NAME>_WORKERS`: sending workers (default: 1)
//! - `TALLY_SERVER_<NAME>_NOTIFY`: NONE, OWNER, OWNER_REVIEWERS or ALL (default: ALL)
//! - `TALLY_VOTE_<OUTCOME>_<AXIS>`: default vote values
//! - `TALLY_CMD_<OUTCOME>`: command templates
//! - `TALLY_DISPATCH_CAPACITY`, `TALLY_DISPATCH_WARN_THRESHOLD`, `TALLY_DISPATCH_SHUTDOWN_SECS`
//! - `TALLY_DELAYED_APPROVAL`: honour per-job delayed approval (default: 1)
//! - `RUST_LOG`: log filter (default: "info"); `TALLY_LOG_FORMAT=json` for JSON lines

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

// Re-export commonly used types
pub use dto::{
    CommandTemplates, DispatchConfig, FEEDBACK_TAG, FeatureFlags, LoggingConfig, ScorePair,
    ServerConfig, TallyConfigDto, VoteTable,
};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::{validate_config, validate_dispatch_config, validate_servers};
