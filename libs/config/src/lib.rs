//! # Remote Node Configuration
//!
//! Loading and validation of the TOML file a `remote-node` process starts
//! from. The crate has no knowledge of the protocol types; the node binary
//! maps a validated [`NodeConfig`] onto link and role settings.
//!
//! ```rust,no_run
//! use config::NodeConfig;
//!
//! let config = NodeConfig::from_file("node.toml")?;
//! config.validate()?;
//! # Ok::<(), config::ConfigError>(())
//! ```

pub mod error;
pub mod node;

pub use error::{ConfigError, Result};
pub use node::{
    LimitSettings, LoggingSettings, NetworkSettings, NodeConfig, NodeRole, NodeSettings,
    DEFAULT_MAX_PAYLOAD_LEN, ENV_PREFIX, MAX_FIELD_LEN_LIMIT, MIN_FIELD_LEN,
};
