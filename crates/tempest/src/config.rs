//! Configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `TEMPEST_`-prefixed environment variables. Nested keys are separated by a
//! double underscore, e.g. `TEMPEST_NETWORK__PORT=50223`.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::network::ReassemblerOptions;

/// File read when no explicit path is given; skipped if absent
pub const DEFAULT_CONFIG_FILE: &str = "tempest.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TEMPEST_";

/// UDP port hubs broadcast on
pub const DEFAULT_PORT: u16 = 50222;

/// Receive buffer large enough for any UDP payload
pub const MAX_DATAGRAM_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{0}")]
    Load(Box<figment::Error>),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Listener and pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name used in logs
    pub name: String,
    /// Bind address; the unspecified address listens on every interface
    pub interface: IpAddr,
    pub port: u16,
    /// Silence after which an unterminated buffer gets one recovery parse
    pub read_timeout_secs: u64,
    /// Frames held between the acceptor and processor
    pub queue_capacity: usize,
    /// Largest datagram read in one call; longer datagrams are truncated
    pub recv_buffer_len: usize,
    /// Messages buffered per subscriber before it lags
    pub event_capacity: usize,
    pub quote_aware: bool,
    pub max_frame_len: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "tempest".to_string(),
            interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            read_timeout_secs: 30,
            queue_capacity: 256,
            recv_buffer_len: MAX_DATAGRAM_LEN,
            event_capacity: 1024,
            quote_aware: true,
            max_frame_len: crate::network::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn reassembler_options(&self) -> ReassemblerOptions {
        ReassemblerOptions {
            quote_aware: self.quote_aware,
            max_frame_len: self.max_frame_len,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file for the redb backend
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/tempest.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tempest=info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Load from defaults, the TOML file at `path` (or `tempest.toml` if it
    /// exists) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Self::from_figment(Self::figment(&file).merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Defaults layered under the TOML file at `file`
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(file))
    }

    /// Extract and validate
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("network.read_timeout_secs", self.network.read_timeout_secs as usize),
            ("network.queue_capacity", self.network.queue_capacity),
            ("network.recv_buffer_len", self.network.recv_buffer_len),
            ("network.event_capacity", self.network.event_capacity),
            ("network.max_frame_len", self.network.max_frame_len),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.storage.backend == StorageBackend::Redb
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "storage.path",
                reason: "required for the redb backend".to_string(),
            });
        }

        Ok(())
    }
}
