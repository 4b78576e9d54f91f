//! Configuration management for Notifybox
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use notifybox::config::Settings;
//!
//! let settings = Settings::load().expect("Failed to load configuration");
//! println!("Dispatch timeout: {}", settings.dispatch.timeout);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `NOTIFYBOX__<section>__<key>`:
//! - `NOTIFYBOX__DISPATCH__CONCURRENCY=8`
//! - `NOTIFYBOX__RETRY__MAX_ATTEMPTS=1`
//! - `NOTIFYBOX__HTTP__REQUEST_TIMEOUT=15s`
//!
//! # Configuration File
//!
//! By default settings are read from `config/notifybox.toml`. This can be
//! overridden using the `NOTIFYBOX_CONFIG` environment variable.
//!
//! Target URLs use the line-oriented format parsed by [`text::parse_text`],
//! either inline in the `urls` key or in separate text files.

mod models;
mod sources;
pub mod text;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    AppSettings, DispatchSettings, HttpSettings, RetrySettings, Settings, TelemetryConfig,
};
pub use sources::config_path;
pub use text::{TextEntry, parse_text};
pub use validation::SettingsValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] SettingsValidationError),
}

impl Settings {
    /// Load settings from all sources (file + environment)
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`NOTIFYBOX__*`)
    /// 2. TOML file (default: `config/notifybox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = sources::load()?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let settings = sources::load_from_sources(path)?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// The `urls` key as text configuration entries
    pub fn url_entries(&self) -> Vec<TextEntry> {
        parse_text(&self.urls.join("\n"))
    }
}
