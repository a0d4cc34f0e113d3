//! Runtime configuration.
//!
//! Settings load from an optional file merged with `PUMPWATCH_*`
//! environment variables (nested keys separated by `__`, e.g.
//! `PUMPWATCH_CONTROLLER__HOST`). Every field has a default, so the
//! process also runs with no configuration at all.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::sampler::SamplerConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Controller endpoint parameters, passed through to whatever transport
/// binds the actual wire protocol.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerSettings {
    pub host: String,
    pub rack: u16,
    pub slot: u16,
    /// Data block holding the pump points.
    pub data_block: u16,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            host: "192.168.200.20".to_string(),
            rack: 0,
            slot: 1,
            data_block: 39,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub controller: ControllerSettings,
    /// SQLite database URL; the file is created when missing.
    pub database_url: String,
    pub sample_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub stop_grace_ms: u64,
    /// While disconnected, try to reconnect every this many cycles.
    pub reconnect_every: u32,
    /// Run against the synthetic reader instead of a controller.
    pub simulate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller: ControllerSettings::default(),
            database_url: "sqlite://pumpwatch.db".to_string(),
            sample_interval_ms: 1000,
            read_timeout_ms: 800,
            stop_grace_ms: 5000,
            reconnect_every: 10,
            simulate: true,
        }
    }
}

impl Settings {
    /// Load settings from `path` (when given) overlaid with `PUMPWATCH_*`
    /// environment variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("PUMPWATCH")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.sample_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "sample_interval_ms must be positive".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.reconnect_every == 0 {
            return Err(SettingsError::Invalid(
                "reconnect_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The sampler timing derived from these settings.
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.sample_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            reconnect_every: self.reconnect_every,
        }
    }
}
