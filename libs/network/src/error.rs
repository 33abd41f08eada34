//! Transport Error Types
//!
//! Failures of the socket layer. Every variant except [`TransportError::Configuration`]
//! leaves the stream in an unknown position, so the connection that produced it
//! must be closed.

use codec::ProtocolError;
use std::io;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer closed the stream, or the socket was shut down under us
    #[error("Connection closed: {context}")]
    ConnectionClosed { context: String },

    /// Declared length exceeds the destination capacity
    #[error("Oversized {field}: declared {len} bytes, maximum {max}")]
    Oversize {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Frame content violated the protocol rules
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn connection_closed(context: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            context: context.into(),
        }
    }

    pub fn oversize(field: &'static str, len: usize, max: usize) -> Self {
        Self::Oversize { field, len, max }
    }

    /// Wrap an I/O error, folding the kinds that mean "peer went away" into
    /// [`TransportError::ConnectionClosed`]
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        let message = message.into();
        match source.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => Self::ConnectionClosed {
                context: format!("{}: {}", message, source),
            },
            _ => Self::Io { message, source },
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// The connection that produced this error can no longer be used
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, TransportError::Configuration { .. })
    }

    /// Peer-initiated or shutdown-initiated close, as opposed to a fault
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed { .. })
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::ConnectionClosed { .. } => "connection_closed",
            TransportError::Oversize { .. } => "oversize",
            TransportError::Protocol(e) => e.category(),
            TransportError::Io { .. } => "io",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Configuration { .. } => "configuration",
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::io("socket operation failed", err)
    }
}
