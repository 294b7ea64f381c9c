//! User configuration (config.toml)
//!
//! Every field has a default, so an empty or missing file is a valid config.

use gifloop_looper::LooperConfig;
use gifloop_media::DEFAULT_MAX_SPAN;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every subcommand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Encoder binary, looked up on PATH when relative
    pub ffmpeg: PathBuf,

    /// Quiet period before a changed parameter triggers a conversion
    pub debounce_ms: u64,

    /// How long a notification stays visible
    pub notification_ms: u64,

    /// Longest range a conversion may cover
    pub max_span_secs: f64,

    /// Default output frame rate
    pub frame_rate: f64,

    /// Default output scale
    pub scale: f64,

    /// Text stamped on the GIF when the logo is enabled
    pub logo_text: String,

    /// Name of the looper's worker thread
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            debounce_ms: 1000,
            notification_ms: 3000,
            max_span_secs: DEFAULT_MAX_SPAN,
            frame_rate: 10.0,
            scale: 0.5,
            logo_text: "gifloop".to_string(),
            thread_name: LooperConfig::default().thread_name,
        }
    }
}

impl Config {
    /// `<config_dir>/gifloop/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gifloop").join("config.toml"))
    }

    /// Load from an explicit path, which must exist
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Load from `--config` when given, else the default location.
    ///
    /// A missing default file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_span_secs >= gifloop_media::MIN_SPAN) {
            return Err(ConfigError::Invalid(format!(
                "max_span_secs must be at least {}, got {}",
                gifloop_media::MIN_SPAN,
                self.max_span_secs
            )));
        }
        if !(self.frame_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scale must be in (0, 1], got {}",
                self.scale
            )));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::Invalid("thread_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Notification lifetime as a duration
    pub fn notification(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    /// Worker settings for the looper
    pub fn looper_config(&self) -> LooperConfig {
        LooperConfig {
            thread_name: self.thread_name.clone(),
            ..LooperConfig::default()
        }
    }
}
