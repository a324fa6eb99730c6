//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration (defaults when no file is given)
//! - Initialize logging before anything else logs
//!
//! # Design Decisions
//! - Fail fast: a config error is fatal
//! - A second logging init (embedding host, tests) is not an error

use std::path::Path;

use crate::config::{load_config, ConfigError, RouterConfig};
use crate::observability::logging::init_logging;

/// Environment variable naming an optional config file.
pub const CONFIG_ENV: &str = "PLUGIN_ROUTER_CONFIG";

/// Load configuration and install logging.
pub fn startup(config_path: Option<&Path>) -> Result<RouterConfig, ConfigError> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if init_logging(&config.observability).is_err() {
        tracing::debug!("Logging already initialized");
    }
    tracing::info!(
        base_url = %config.base_url,
        safe_mode = config.safe_mode,
        "plugin-router starting"
    );
    Ok(config)
}
