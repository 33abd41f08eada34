//! Transport Layer
//!
//! Per-connection plumbing shared by both protocol roles:
//! - [`FrameReader`] / [`FrameWriter`]: command framing over any async stream
//! - [`Link`]: a connected reader/writer pair with a peer label and a
//!   bidirectional shutdown handle
//! - [`tcp`]: dialing, listening and accepting TCP links

pub mod frame;
pub mod tcp;

#[cfg(test)]
mod tests;

pub use frame::{FrameReader, FrameWriter, READ_CHUNK};
pub use tcp::{accept, bind, dial, ShutdownHandle, TcpLink, TcpLinkConfig};

use codec::FrameLimits;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection id
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Byte and frame counters for one connection, shared by its reader and writer
#[derive(Debug)]
pub struct ConnectionStats {
    connected_at: Instant,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            connected_duration: self.connected_at.elapsed(),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub connected_duration: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
}

/// A connected stream split into its framed halves
pub struct Link<R, W> {
    pub reader: FrameReader<R>,
    pub writer: FrameWriter<W>,
    /// Human-readable peer label for logs
    pub peer: String,
    pub shutdown: ShutdownHandle,
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build a link over arbitrary stream halves
    ///
    /// Without a socket behind it the shutdown handle is detached; closing
    /// such a link relies on dropping the halves.
    pub fn new(read: R, write: W, peer: impl Into<String>, limits: FrameLimits) -> Self {
        Self::with_shutdown(read, write, peer, limits, ShutdownHandle::detached())
    }

    pub fn with_shutdown(
        read: R,
        write: W,
        peer: impl Into<String>,
        limits: FrameLimits,
        shutdown: ShutdownHandle,
    ) -> Self {
        let stats = Arc::new(ConnectionStats::new());
        Self {
            reader: FrameReader::with_stats(read, limits, stats.clone()),
            writer: FrameWriter::with_stats(write, limits, stats),
            peer: peer.into(),
            shutdown,
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        self.reader.stats()
    }
}
