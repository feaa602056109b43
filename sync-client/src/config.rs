//! Client configuration.
//!
//! Configuration can be built in code with the `with_*` methods or loaded
//! from a TOML file. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! server_url = "ws://localhost:3000"
//! typing_pause_ms = 1000
//! preview_mode = "inline"
//!
//! [preview]
//! panel_debounce_ms = 1000
//! inline_debounce_ms = 500
//!
//! [reconnect]
//! initial_ms = 1000
//! max_ms = 30000
//! jitter_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use codesync_core::{BackoffPolicy, PreviewMode, PreviewTiming};
use serde::{Deserialize, Serialize};

/// Configuration for [`CollabClient`](crate::CollabClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address of the coordination server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Quiet period before `typing-paused` is sent, in milliseconds.
    #[serde(default = "default_typing_pause_ms")]
    pub typing_pause_ms: u64,
    /// Initial preview presentation.
    #[serde(default)]
    pub preview_mode: PreviewMode,
    /// Preview regeneration timing.
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Preview regeneration timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Quiet period of the side panel, in milliseconds (default: 1000).
    #[serde(default = "default_panel_debounce_ms")]
    pub panel_debounce_ms: u64,
    /// Quiet period of the inline preview, in milliseconds (default: 500).
    #[serde(default = "default_inline_debounce_ms")]
    pub inline_debounce_ms: u64,
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay, in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_ms: u64,
    /// Cap of the exponential delay, in milliseconds (default: 30000).
    #[serde(default = "default_reconnect_max_ms")]
    pub max_ms: u64,
    /// Upper bound of the random jitter, in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_jitter_ms")]
    pub jitter_ms: u64,
}

/// Upper bound of the typing-pause and preview quiet periods.
pub const MAX_QUIET_PERIOD_MS: u64 = 10_000;

// Default value functions
fn default_server_url() -> String {
    "ws://localhost:3000".to_string()
}

fn default_typing_pause_ms() -> u64 {
    1000
}

fn default_panel_debounce_ms() -> u64 {
    1000
}

fn default_inline_debounce_ms() -> u64 {
    500
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_reconnect_jitter_ms() -> u64 {
    1000
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            panel_debounce_ms: default_panel_debounce_ms(),
            inline_debounce_ms: default_inline_debounce_ms(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_reconnect_initial_ms(),
            max_ms: default_reconnect_max_ms(),
            jitter_ms: default_reconnect_jitter_ms(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            typing_pause_ms: default_typing_pause_ms(),
            preview_mode: PreviewMode::default(),
            preview: PreviewConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a default configuration for the given server.
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::InvalidToml(source) => ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::InvalidToml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.is_empty() {
            return Err(ConfigError::Invalid("server_url must not be empty".into()));
        }
        let quiet_periods = [
            ("typing_pause_ms", self.typing_pause_ms),
            ("preview.panel_debounce_ms", self.preview.panel_debounce_ms),
            ("preview.inline_debounce_ms", self.preview.inline_debounce_ms),
        ];
        for (name, ms) in quiet_periods {
            if ms == 0 || ms > MAX_QUIET_PERIOD_MS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and {MAX_QUIET_PERIOD_MS} ms (got {ms})"
                )));
            }
        }
        if self.reconnect.initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.initial_ms must be positive".into(),
            ));
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(ConfigError::Invalid(
                "reconnect.max_ms must not be below reconnect.initial_ms".into(),
            ));
        }
        Ok(())
    }

    /// Set the server address.
    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = url.to_string();
        self
    }

    /// Set the typing-pause window.
    pub fn with_typing_pause(mut self, window: Duration) -> Self {
        self.typing_pause_ms = window.as_millis() as u64;
        self
    }

    /// Set the initial preview presentation.
    pub fn with_preview_mode(mut self, mode: PreviewMode) -> Self {
        self.preview_mode = mode;
        self
    }

    /// Set both preview quiet periods.
    pub fn with_preview_timing(mut self, panel: Duration, inline: Duration) -> Self {
        self.preview.panel_debounce_ms = panel.as_millis() as u64;
        self.preview.inline_debounce_ms = inline.as_millis() as u64;
        self
    }

    /// Set the reconnect backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, jitter: Duration) -> Self {
        self.reconnect = ReconnectConfig {
            initial_ms: initial.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            jitter_ms: jitter.as_millis() as u64,
        };
        self
    }

    /// The typing-pause window.
    pub fn typing_pause(&self) -> Duration {
        Duration::from_millis(self.typing_pause_ms)
    }

    /// Preview quiet periods.
    pub fn preview_timing(&self) -> PreviewTiming {
        PreviewTiming {
            panel: Duration::from_millis(self.preview.panel_debounce_ms),
            inline: Duration::from_millis(self.preview.inline_debounce_ms),
        }
    }

    /// Reconnect policy for the session machine.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.reconnect.initial_ms),
            max: Duration::from_millis(self.reconnect.max_ms),
            jitter: Duration::from_millis(self.reconnect.jitter_ms),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Failed to parse configuration text.
    #[error("failed to parse config: {0}")]
    InvalidToml(#[source] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
