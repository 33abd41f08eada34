//! Remote actor error types

use codec::ProtocolError;
use network::TransportError;
use thiserror::Error;

/// Errors surfaced by the master, slave and shutdown coordinator
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No ready link is available to place a remote actor on
    #[error("No slave link available for remote actor creation")]
    NoSlaveAvailable,

    /// The named connection is not (or no longer) open
    #[error("Unknown connection {connection}")]
    UnknownConnection { connection: String },

    #[error("Unknown actor {uuid}")]
    UnknownActor { uuid: String },

    #[error("Unknown actor type '{type_name}'")]
    UnknownActorType { type_name: String },

    /// The local runtime could not instantiate an actor
    #[error("Actor creation failed: {message}")]
    ActorCreation { message: String },

    /// Command arrived before the version handshake completed
    #[error("Command {command} received before version check")]
    HandshakeRequired { command: &'static str },

    #[error("Version mismatch: expected {expected}, peer sent {got}")]
    VersionMismatch { expected: String, got: String },

    /// Identifier is empty, too long, or already in use
    #[error("Invalid actor identifier '{uuid}': {reason}")]
    InvalidIdentifier { uuid: String, reason: String },

    /// The role has no master or slave configured for this operation
    #[error("Role not configured: {role}")]
    RoleNotConfigured { role: &'static str },

    #[error("Remote runtime is shut down")]
    ShutDown,
}

/// Result type for remote actor operations
pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    pub fn unknown_actor(uuid: impl Into<String>) -> Self {
        Self::UnknownActor { uuid: uuid.into() }
    }

    pub fn unknown_actor_type(type_name: impl Into<String>) -> Self {
        Self::UnknownActorType {
            type_name: type_name.into(),
        }
    }

    pub fn actor_creation(message: impl Into<String>) -> Self {
        Self::ActorCreation {
            message: message.into(),
        }
    }

    pub fn invalid_identifier(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    pub fn version_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::VersionMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Error category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            RemoteError::Transport(e) => e.category(),
            RemoteError::Protocol(e) => e.category(),
            RemoteError::NoSlaveAvailable => "no_slave",
            RemoteError::UnknownConnection { .. } => "unknown_connection",
            RemoteError::UnknownActor { .. } => "unknown_actor",
            RemoteError::UnknownActorType { .. } => "unknown_actor_type",
            RemoteError::ActorCreation { .. } => "actor_creation",
            RemoteError::HandshakeRequired { .. } => "handshake_required",
            RemoteError::VersionMismatch { .. } => "version_mismatch",
            RemoteError::InvalidIdentifier { .. } => "invalid_identifier",
            RemoteError::RoleNotConfigured { .. } => "role_not_configured",
            RemoteError::ShutDown => "shut_down",
        }
    }

    /// Fatal to the connection the triggering frame arrived on
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            RemoteError::Transport(e) => e.is_connection_fatal(),
            RemoteError::Protocol(_)
            | RemoteError::HandshakeRequired { .. }
            | RemoteError::VersionMismatch { .. } => true,
            _ => false,
        }
    }
}
