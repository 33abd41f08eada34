//! Frame size limits
//!
//! Bounds every declared length before a single field byte is read. The wire
//! format itself caps text fields at 255 bytes (one length byte) and payloads at
//! `u32::MAX`; a node may configure tighter bounds, never looser ones, which the
//! field types enforce.

use crate::command::{Field, LengthPrefix};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Default payload ceiling, matching the 16MB TCP message limit used elsewhere
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Configured maximum lengths for decoded and encoded fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLimits {
    /// Largest accepted text field (uuid, type name, behavior name, token)
    pub max_field_len: u8,
    /// Largest accepted message or reply payload
    pub max_payload_len: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_field_len: u8::MAX,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl FrameLimits {
    /// Everything the wire format can express
    pub const PROTOCOL_MAX: FrameLimits = FrameLimits {
        max_field_len: u8::MAX,
        max_payload_len: u32::MAX,
    };

    pub fn new(max_field_len: u8, max_payload_len: u32) -> Self {
        Self {
            max_field_len,
            max_payload_len,
        }
    }

    /// Maximum accepted length for `field`
    pub fn max_len(&self, field: Field) -> usize {
        match field.prefix() {
            LengthPrefix::U8 => self.max_field_len as usize,
            LengthPrefix::U32 => self.max_payload_len as usize,
        }
    }

    /// Reject `len` for `field` if it is above the limit; a length exactly at the limit passes
    pub fn check(&self, field: Field, len: usize) -> ProtocolResult<()> {
        let max = self.max_len(field);
        if len <= max {
            return Ok(());
        }
        match field.prefix() {
            LengthPrefix::U8 => Err(ProtocolError::field_too_long(field.name(), len, max)),
            LengthPrefix::U32 => Err(ProtocolError::payload_too_large(len, max)),
        }
    }
}
