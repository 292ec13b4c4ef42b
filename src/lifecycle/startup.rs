//! Startup configuration.

use std::path::Path;

use crate::config::{load_config, ConfigError, ServerConfig};

/// Load the configuration file, or fall back to defaults when none is given.
pub fn load_initial_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = load_config(path)?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Ok(ServerConfig::default())
        }
    }
}
