//! Network Infrastructure
//!
//! Socket transport for the remote actor protocol. Turns byte streams into
//! [`codec::Command`] values and back, and establishes TCP links between
//! nodes. Protocol semantics (who may send what, actor bookkeeping) live in
//! `remote-actors`; this crate only moves frames.

pub mod error;
pub mod transports;

pub use error::{Result, TransportError};
pub use transports::{
    accept, bind, dial, ConnectionId, ConnectionStats, ConnectionStatsSnapshot, FrameReader,
    FrameWriter, Link, ShutdownHandle, TcpLink, TcpLinkConfig, READ_CHUNK,
};

/// Default connection timeout for outgoing links
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;
