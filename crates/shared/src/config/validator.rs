//! Configuration validation
//!
//! This module provides validation logic for configuration DTOs.

use std::collections::HashSet;

use super::dto::{DispatchConfig, ServerConfig, TallyConfigDto};
use super::error::{ConfigError, Result};

/// Upper bound for sending workers per server
pub const MAX_SENDING_WORKER_THREADS: usize = 64;

/// Validate a front-end root URL
///
/// # Returns
///
/// Ok(()) if the URL is absolute http(s) and ends with `/`
pub fn validate_front_end_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ConfigError::InvalidUrl(
            "Front-end URL cannot be empty".to_string(),
        ));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidUrl(format!(
            "Front-end URL must start with http:// or https://, got: {}",
            url
        )));
    }

    if !url.ends_with('/') {
        return Err(ConfigError::InvalidUrl(format!(
            "Front-end URL must end with '/', got: {}",
            url
        )));
    }

    Ok(())
}

/// Validate the server list: non-empty, unique names, sane worker counts
pub fn validate_servers(servers: &[ServerConfig]) -> Result<()> {
    if servers.is_empty() {
        return Err(ConfigError::Validation(
            "At least one review server must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for server in servers {
        if server.name.as_str().is_empty() {
            return Err(ConfigError::Validation(
                "Server name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(server.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate server name: {}",
                server.name
            )));
        }

        if server.sending_worker_threads == 0
            || server.sending_worker_threads > MAX_SENDING_WORKER_THREADS
        {
            return Err(ConfigError::Validation(format!(
                "Server {} must have between 1 and {} sending workers, got {}",
                server.name, MAX_SENDING_WORKER_THREADS, server.sending_worker_threads
            )));
        }

        validate_front_end_url(&server.front_end_url)?;
    }

    Ok(())
}

/// Validate dispatch queue limits
pub fn validate_dispatch_config(config: &DispatchConfig) -> Result<()> {
    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "Dispatch queue capacity must be greater than 0".to_string(),
        ));
    }

    if config.warning_threshold == 0 {
        return Err(ConfigError::Validation(
            "Dispatch warning threshold must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate the complete configuration
pub fn validate_config(config: &TallyConfigDto) -> Result<()> {
    validate_servers(&config.servers)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}
