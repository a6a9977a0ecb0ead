//! Configuration system for Pulse.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PULSE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pulse/config.toml
//!   3. ~/.config/pulse/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Public relay used when nothing else is configured.
pub const DEFAULT_RELAY_URL: &str = "wss://pulse.relay.app";

/// Default chunk payload size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub client: ClientConfig,
    pub relay: RelayConfig,
    pub history: HistoryConfig,
}

/// Settings consumed by the sending and receiving endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay base URL, `ws://` or `wss://`.
    pub relay_url: String,
    /// Plaintext bytes per chunk.
    pub chunk_size: usize,
    /// Per-wait timeout in seconds (waiting for the peer, each read).
    pub timeout_secs: u64,
    /// Connection attempts before giving up.
    pub retries: u32,
    pub debug: bool,
}

/// How the relay decides that a room has lived too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryMode {
    /// Close rooms a fixed time after creation, regardless of activity.
    SinceCreated,
    /// Close rooms that have forwarded nothing for the TTL.
    SinceLastActivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    /// Participants per room.
    pub room_capacity: usize,
    pub room_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub expiry: ExpiryMode,
    /// Directory holding receiver.html and sender.html. Empty = not served.
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
    /// Oldest records are dropped beyond this count.
    pub max_entries: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: 300,
            retries: 3,
            debug: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            room_capacity: 2,
            room_ttl_secs: 600,
            sweep_interval_secs: 60,
            expiry: ExpiryMode::SinceCreated,
            static_dir: PathBuf::new(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: dirs_or_home().join(".pulse").join("history.json"),
            max_entries: 100,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RelayConfig {
    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("pulse")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PulseConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            PulseConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PULSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config to `path` if none exists. Returns the path.
    pub fn write_default_if_missing(path: &std::path::Path) -> Result<PathBuf, ConfigError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
            }
            let text = toml::to_string_pretty(&PulseConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(path, text)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        Ok(path.to_path_buf())
    }

    /// Apply PULSE_* overrides. `lookup` abstracts the environment so tests
    /// never touch process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |v: &str| v == "true" || v == "1";

        if let Some(v) = lookup("PULSE_CLIENT__RELAY_URL") {
            self.client.relay_url = v;
        }
        if let Some(v) = lookup("PULSE_CLIENT__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.client.chunk_size = v;
        }
        if let Some(v) = lookup("PULSE_CLIENT__TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.client.timeout_secs = v;
        }
        if let Some(v) = lookup("PULSE_CLIENT__RETRIES").and_then(|v| v.parse().ok()) {
            self.client.retries = v;
        }
        if let Some(v) = lookup("PULSE_CLIENT__DEBUG") {
            self.client.debug = flag(&v);
        }

        if let Some(v) = lookup("PULSE_RELAY__BIND") {
            self.relay.bind = v;
        }
        // PORT is honoured for container platforms that inject it.
        if let Some(v) = lookup("PULSE_RELAY__PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|v| v.parse().ok())
        {
            self.relay.port = v;
        }
        if let Some(v) = lookup("PULSE_RELAY__ROOM_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.relay.room_ttl_secs = v;
        }
        if let Some(v) = lookup("PULSE_RELAY__SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.relay.sweep_interval_secs = v;
        }
        if let Some(v) = lookup("PULSE_RELAY__EXPIRY") {
            match v.as_str() {
                "since_created" => self.relay.expiry = ExpiryMode::SinceCreated,
                "since_last_activity" => self.relay.expiry = ExpiryMode::SinceLastActivity,
                _ => {}
            }
        }
        if let Some(v) = lookup("PULSE_RELAY__STATIC_DIR") {
            self.relay.static_dir = PathBuf::from(v);
        }

        if let Some(v) = lookup("PULSE_HISTORY__PATH") {
            self.history.path = PathBuf::from(v);
        }
    }
}
