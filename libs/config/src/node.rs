//! Node Configuration
//!
//! One TOML file describes a node: which role it plays, where it listens or
//! which peers it dials, the frame limits it enforces and how it logs.
//!
//! ```toml
//! [node]
//! role = "slave"
//! name = "worker-1"
//! version_token = "cluster-v1"   # optional, defaults to the build fingerprint
//!
//! [network]
//! listen = "0.0.0.0:7400"
//! connect = []
//! connect_timeout_ms = 5000
//! nodelay = true
//!
//! [limits]
//! max_field_len = 255            # 36..=255, one length byte
//! max_payload_len = 16777216
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Every section has defaults, so an empty file is a master with no
//! addresses. [`NodeConfig::load`] layers `REMOTE_NODE__<SECTION>__<KEY>`
//! environment variables over the file.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Largest field length a single length byte can declare
pub const MAX_FIELD_LEN_LIMIT: u32 = 255;

/// Smallest field limit that still carries a generated actor uuid
/// (36 bytes, hyphenated v4)
pub const MIN_FIELD_LEN: u32 = 36;

/// Default payload ceiling, 16 MiB
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 16 * 1024 * 1024;

/// Prefix of environment overrides read by [`NodeConfig::load`]
pub const ENV_PREFIX: &str = "REMOTE_NODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Master,
    Slave,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave => write!(f, "slave"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(NodeRole::Master),
            "slave" => Ok(NodeRole::Slave),
            other => Err(ConfigError::invalid(
                "node.role",
                format!("expected \"master\" or \"slave\", got {:?}", other),
            )),
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub network: NetworkSettings,
    pub limits: LimitSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeSettings {
    pub role: NodeRole,
    pub name: String,
    /// Overrides the build fingerprint when set
    pub version_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub listen: Option<SocketAddr>,
    pub connect: Vec<SocketAddr>,
    pub connect_timeout_ms: u64,
    pub nodelay: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_field_len: u32,
    pub max_payload_len: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            role: NodeRole::default(),
            name: "remote-node".to_string(),
            version_token: None,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            listen: None,
            connect: Vec::new(),
            connect_timeout_ms: 5_000,
            nodelay: true,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_field_len: MAX_FIELD_LEN_LIMIT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a TOML file as is
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded node config file");
        Self::from_toml_str(&contents)
    }

    /// Optional TOML file with `REMOTE_NODE__*` environment variables on top
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config_crate::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            builder = builder.add_source(
                config_crate::File::from(path)
                    .format(config_crate::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config_crate::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("network.connect")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        debug!(role = %config.node.role, name = %config.node.name, "Node config loaded");
        Ok(config)
    }

    /// Reject values no node can run with
    pub fn validate(&self) -> Result<()> {
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::invalid("node.name", "must not be empty"));
        }
        if let Some(token) = &self.node.version_token {
            if token.is_empty() || token.len() > MAX_FIELD_LEN_LIMIT as usize {
                return Err(ConfigError::invalid(
                    "node.version_token",
                    format!("length must be 1..={}, got {}", MAX_FIELD_LEN_LIMIT, token.len()),
                ));
            }
        }

        if self.network.listen.is_none() && self.network.connect.is_empty() {
            return Err(ConfigError::invalid(
                "network",
                format!("a {} needs `listen` or at least one `connect` address", self.node.role),
            ));
        }
        if self.network.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("network.connect_timeout_ms", "must be positive"));
        }

        let limits = &self.limits;
        if !(MIN_FIELD_LEN..=MAX_FIELD_LEN_LIMIT).contains(&limits.max_field_len) {
            return Err(ConfigError::invalid(
                "limits.max_field_len",
                format!(
                    "must be {}..={}, got {}",
                    MIN_FIELD_LEN, MAX_FIELD_LEN_LIMIT, limits.max_field_len
                ),
            ));
        }
        if limits.max_payload_len == 0 || limits.max_payload_len > u64::from(u32::MAX) {
            return Err(ConfigError::invalid(
                "limits.max_payload_len",
                format!("must be 1..={}, got {}", u32::MAX, limits.max_payload_len),
            ));
        }
        if let Some(token) = &self.node.version_token {
            if token.len() > limits.max_field_len as usize {
                return Err(ConfigError::invalid(
                    "node.version_token",
                    "longer than limits.max_field_len",
                ));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }
}
