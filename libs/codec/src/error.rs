//! Protocol-level errors for remote actor frame processing
//!
//! Every variant describes a frame the codec refused to produce or accept.
//! Apart from [`ProtocolError::Incomplete`], which only means "wait for more
//! bytes", each of them is fatal to the connection that carried the frame.

use crate::command::Role;
use thiserror::Error;

/// Framing errors with enough context to debug a misbehaving peer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ends before the frame does
    #[error("Incomplete frame: need {need} bytes, got {got}")]
    Incomplete { need: usize, got: usize },

    /// Tag byte is not part of this build's command vocabulary
    #[error("Unknown command tag {tag:#04x}: valid tags are 0x00-0x05")]
    UnknownCommand { tag: u8 },

    /// A length-prefixed text field exceeds the configured maximum
    #[error("Field '{field}' too long: {len} bytes exceeds limit {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Message or reply payload exceeds the configured maximum
    #[error("Payload too large: {len} bytes exceeds limit {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Command received from a role that may not send it
    #[error("Command {command} may not be sent by a {sender}")]
    WrongDirection { command: &'static str, sender: Role },

    /// Text field is not valid UTF-8
    #[error("Field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Field list does not match the command's layout
    #[error("Command {command} expects {expected} fields, got {got}")]
    FieldCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },
}

impl ProtocolError {
    pub fn incomplete(need: usize, got: usize) -> Self {
        Self::Incomplete { need, got }
    }

    pub fn unknown_command(tag: u8) -> Self {
        Self::UnknownCommand { tag }
    }

    pub fn field_too_long(field: &'static str, len: usize, max: usize) -> Self {
        Self::FieldTooLong { field, len, max }
    }

    pub fn payload_too_large(len: usize, max: usize) -> Self {
        Self::PayloadTooLarge { len, max }
    }

    pub fn wrong_direction(command: &'static str, sender: Role) -> Self {
        Self::WrongDirection { command, sender }
    }

    pub fn invalid_utf8(field: &'static str) -> Self {
        Self::InvalidUtf8 { field }
    }

    pub fn field_count(command: &'static str, expected: usize, got: usize) -> Self {
        Self::FieldCount {
            command,
            expected,
            got,
        }
    }

    /// More bytes may still complete the frame
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }

    /// A declared length was rejected before any payload was copied
    pub fn is_oversize(&self) -> bool {
        matches!(self, Self::FieldTooLong { .. } | Self::PayloadTooLarge { .. })
    }

    /// Error category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "incomplete",
            Self::UnknownCommand { .. } => "unknown_command",
            Self::FieldTooLong { .. } | Self::PayloadTooLarge { .. } => "oversize",
            Self::WrongDirection { .. } => "wrong_direction",
            Self::InvalidUtf8 { .. } => "invalid_utf8",
            Self::FieldCount { .. } => "field_count",
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
