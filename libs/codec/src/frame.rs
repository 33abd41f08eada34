//! # Frame Codec - Pure Byte-Buffer Transforms
//!
//! ## Purpose
//!
//! Encodes [`Command`] values into self-delimited frames and decodes frames out
//! of byte slices. No I/O happens here; the network crate feeds socket bytes
//! through the same layout rules field by field.
//!
//! ## Decoding Guarantees
//!
//! - A declared length is checked against [`FrameLimits`] before the bytes it
//!   covers are sliced or copied. Oversized lengths are errors, never
//!   truncated or wrapped.
//! - A buffer that ends mid-frame yields [`ProtocolError::Incomplete`] with the
//!   number of bytes required to make progress.
//! - An unknown tag is [`ProtocolError::UnknownCommand`].
//!
//! ## Encoding Guarantees
//!
//! Every field is validated against the limits before anything is written, so
//! a frame that would be rejected by a peer with the same limits is never
//! produced.

use crate::command::{Command, CommandTag, LengthPrefix};
use crate::error::{ProtocolError, ProtocolResult};
use crate::limits::FrameLimits;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Size of the command tag that opens every frame
pub const TAG_LEN: usize = 1;

impl LengthPrefix {
    /// Bytes used by the length prefix itself
    pub fn width(self) -> usize {
        match self {
            LengthPrefix::U8 => 1,
            LengthPrefix::U32 => 4,
        }
    }
}

/// Total encoded size of `command`, tag included
pub fn encoded_len(command: &Command) -> usize {
    let layout = command.tag().layout();
    TAG_LEN
        + command
            .field_bytes()
            .iter()
            .zip(layout)
            .map(|(bytes, field)| field.prefix().width() + bytes.len())
            .sum::<usize>()
}

/// Stateless encoder/decoder bound to a set of limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCodec {
    limits: FrameLimits,
}

impl FrameCodec {
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }

    /// Encode `command` into a freshly allocated frame
    pub fn encode(&self, command: &Command) -> ProtocolResult<Bytes> {
        let mut dst = BytesMut::with_capacity(encoded_len(command));
        self.encode_into(command, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the frame for `command` to `dst`
    ///
    /// Nothing is written if any field violates the limits.
    pub fn encode_into(&self, command: &Command, dst: &mut BytesMut) -> ProtocolResult<()> {
        let tag = command.tag();
        let fields = command.field_bytes();
        let layout = tag.layout();

        for (bytes, field) in fields.iter().zip(layout) {
            self.limits.check(*field, bytes.len())?;
        }

        dst.reserve(encoded_len(command));
        dst.put_u8(tag.into());
        for (bytes, field) in fields.iter().zip(layout) {
            match field.prefix() {
                // Lengths were bounded by the limit check above
                LengthPrefix::U8 => dst.put_u8(bytes.len() as u8),
                LengthPrefix::U32 => dst.put_u32(bytes.len() as u32),
            }
            dst.put_slice(bytes);
        }
        Ok(())
    }

    /// Decode one frame from the front of `src`
    ///
    /// Returns the command and the number of bytes it occupied.
    pub fn decode(&self, src: &[u8]) -> ProtocolResult<(Command, usize)> {
        let tag_byte = *src
            .first()
            .ok_or_else(|| ProtocolError::incomplete(TAG_LEN, 0))?;
        let tag = CommandTag::from_byte(tag_byte)?;

        let mut offset = TAG_LEN;
        let mut fields = Vec::with_capacity(tag.layout().len());

        for field in tag.layout() {
            let width = field.prefix().width();
            let prefix = src
                .get(offset..offset + width)
                .ok_or_else(|| ProtocolError::incomplete(offset + width, src.len()))?;
            let len = match field.prefix() {
                LengthPrefix::U8 => prefix[0] as usize,
                LengthPrefix::U32 => {
                    u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize
                }
            };
            offset += width;

            if let Err(e) = self.limits.check(*field, len) {
                debug!(command = %tag, field = field.name(), len, "Rejected oversized field");
                return Err(e);
            }

            let body = src
                .get(offset..offset + len)
                .ok_or_else(|| ProtocolError::incomplete(offset + len, src.len()))?;
            fields.push(Bytes::copy_from_slice(body));
            offset += len;
        }

        Ok((Command::from_fields(tag, fields)?, offset))
    }
}
