//! TCP Link Establishment
//!
//! Dial and accept produce a [`TcpLink`] whose halves are owned by separate
//! tasks. A duplicate of the socket is kept in a [`ShutdownHandle`] so any task
//! can shut both directions down; a reader blocked on the socket then wakes
//! with EOF.

use super::Link;
use crate::{Result, TransportError};
use codec::FrameLimits;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// TCP link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpLinkConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on every link
    pub nodelay: bool,
    /// Field and payload limits applied in both directions
    pub limits: FrameLimits,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(crate::DEFAULT_CONNECTION_TIMEOUT_SECS),
            nodelay: true,
            limits: FrameLimits::default(),
        }
    }
}

/// Link over a TCP socket
pub type TcpLink = Link<OwnedReadHalf, OwnedWriteHalf>;

/// Shuts both directions of a socket down, at most once
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    socket: Arc<Mutex<Option<std::net::TcpStream>>>,
}

impl ShutdownHandle {
    pub fn new(socket: std::net::TcpStream) -> Self {
        Self {
            socket: Arc::new(Mutex::new(Some(socket))),
        }
    }

    /// Handle with no socket behind it
    pub fn detached() -> Self {
        Self::default()
    }

    /// Shut down reads and writes; later calls do nothing
    ///
    /// Returns whether this call performed the shutdown.
    pub fn shutdown(&self) -> bool {
        let Some(socket) = self.socket.lock().take() else {
            return false;
        };
        match socket.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => warn!(error = %e, "Error shutting down TCP socket"),
        }
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.socket.lock().is_none()
    }
}

/// Connect to `addr` within the configured timeout
pub async fn dial(addr: SocketAddr, config: &TcpLinkConfig) -> Result<TcpLink> {
    info!(peer = %addr, "Connecting to TCP peer");

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            TransportError::timeout("TCP connect", config.connect_timeout.as_millis() as u64)
        })?
        .map_err(|e| TransportError::io(format!("Failed to connect to {}", addr), e))?;

    let link = into_link(stream, config)?;
    info!(peer = %link.peer, "Connected to TCP peer");
    Ok(link)
}

/// Bind a listener for incoming links
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::io(format!("Failed to bind TCP listener on {}", addr), e))?;
    let local = listener.local_addr().unwrap_or(addr);
    info!(addr = %local, "TCP listener bound");
    Ok(listener)
}

/// Accept the next incoming link
pub async fn accept(listener: &TcpListener, config: &TcpLinkConfig) -> Result<TcpLink> {
    let (stream, peer_addr) = listener
        .accept()
        .await
        .map_err(|e| TransportError::io("Failed to accept TCP connection", e))?;
    let link = into_link(stream, config)?;
    info!(peer = %peer_addr, "Accepted TCP connection");
    Ok(link)
}

fn into_link(stream: TcpStream, config: &TcpLinkConfig) -> Result<TcpLink> {
    if config.nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
    }
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // Keep a duplicate descriptor for shutdown; the tokio stream owns the original
    let std_stream = stream
        .into_std()
        .map_err(|e| TransportError::io("Failed to detach TCP stream", e))?;
    let control = std_stream
        .try_clone()
        .map_err(|e| TransportError::io("Failed to duplicate TCP socket", e))?;
    let stream = TcpStream::from_std(std_stream)
        .map_err(|e| TransportError::io("Failed to register TCP stream", e))?;

    debug!(peer = %peer, "TCP link ready");
    let (read, write) = stream.into_split();
    Ok(Link::with_shutdown(
        read,
        write,
        peer,
        config.limits,
        ShutdownHandle::new(control),
    ))
}
