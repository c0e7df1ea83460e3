//! Configuration management for wm-import
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `WM__<section>__<key>`
//!
//! Examples:
//! - `WM__IMPORT__PARALLEL=20`
//! - `WM__IMPORT__UNPLAYBACKABLE_PATH=cache/unplaybackable.json`
//! - `WM__WAYBACK__CDX_URL=http://localhost:8080/cdx`
//!
//! Database credentials only come from `WEB_MONITORING_DB_EMAIL` and
//! `WEB_MONITORING_DB_PASSWORD` (plus `WEB_MONITORING_DB_URL` for the host).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/wm.toml`.
//! This can be overridden using the `WM_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, DatabaseConfig, ImportConfig, PageFilterConfig, RetryConfig, RetryPolicy,
    SkipUnchanged, WaybackConfig, WorklistConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
