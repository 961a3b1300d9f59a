//! Configuration loading and persistence.
//!
//! Handles reading and writing the panel configuration file. Every field can
//! be overridden from the environment, which is how the panel is usually
//! pointed at a backend on another machine.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};

/// Port the backend listens on during development.
pub const DEFAULT_DEBUG_PORT: u16 = 3511;

/// Configuration for the panel client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PanelConfig {
    /// Host (and optional port) serving the backend API, e.g. `192.168.1.20:3511`.
    pub host: String,
    /// Debug mode: the API port is replaced with `debug_port`.
    pub debug: bool,
    /// Port used in debug mode.
    pub debug_port: u16,
    /// What to do when a WebSocket stream closes.
    pub reconnect: ReconnectPolicy,
    /// STUN/TURN URLs for the WebRTC MFD stream.
    pub ice_servers: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: format!("127.0.0.1:{DEFAULT_DEBUG_PORT}"),
            debug: false,
            debug_port: DEFAULT_DEBUG_PORT,
            reconnect: ReconnectPolicy::default(),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Reconnection policy for the WebSocket transports.
///
/// The default (`max_attempts = 0`) never reconnects: the first close is
/// terminal and the transport stays failed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts after a close before giving up. 0 disables reconnects.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubled delay.
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    pub fn never() -> Self {
        Self::default()
    }

    /// Delay before reconnect attempt `attempt` (0-based), or `None` once
    /// the attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Some(Duration::from_millis(ms))
    }
}

impl PanelConfig {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `TCD_CONFIG_DIR` overrides the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory is known for this platform
    /// or it cannot be created.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("TCD_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("tcd-panel")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    /// A missing or unreadable file falls back to the defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_dir() {
            Ok(dir) => Self::load_from(&dir.join("config.json")).unwrap_or_else(|e| {
                log::debug!("Using default config: {:#}", e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("No config directory: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a configuration file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TCD_HOST") {
            self.host = host;
        }

        if let Ok(debug) = std::env::var("TCD_DEBUG") {
            self.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }

        if let Ok(port) = std::env::var("TCD_DEBUG_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.debug_port = port;
            }
        }

        if let Ok(attempts) = std::env::var("TCD_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                self.reconnect.max_attempts = attempts;
            }
        }
    }

    /// Persists the current configuration to `<config dir>/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_dir()?.join("config.json");
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Write the configuration to `path`.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
