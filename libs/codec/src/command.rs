//! # Command Model - Remote Actor Protocol Vocabulary
//!
//! ## Purpose
//!
//! The closed set of commands exchanged between a master and its slaves, the
//! byte tag that identifies each one on the wire, and the fixed field layout
//! every frame follows after its tag. The layout table is the single source of
//! truth for framing: the slice decoder in [`crate::frame`] and the streaming
//! socket reader in the network crate both walk [`CommandTag::layout`] instead
//! of hard-coding field orders.
//!
//! ## Wire Layout
//!
//! ```text
//! tag  command        fields (in order)
//! 0x00 Null           -
//! 0x01 VersionCheck   u8 len + version token
//! 0x02 CreateActor    u8 len + actor uuid, u8 len + type name
//! 0x03 DestroyActor   u8 len + actor uuid
//! 0x04 SendMessage    u8 len + actor uuid, u8 len + behavior name, u32 len + payload
//! 0x05 SendReply      u8 len + actor uuid, u32 len + payload
//! ```
//!
//! ## Direction Rules
//!
//! Every command has exactly one authorized sender. `SendReply` travels
//! slave → master; everything else travels master → slave. A frame arriving
//! from the wrong direction means the peer's framing can no longer be trusted
//! and the connection must be closed.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a link a node plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Originates actor lifecycle and messaging requests
    Master,
    /// Hosts actor execution and answers with replies
    Slave,
}

impl Role {
    /// The role on the other end of a link
    pub fn peer(self) -> Role {
        match self {
            Role::Master => Role::Slave,
            Role::Slave => Role::Master,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Slave => f.write_str("slave"),
        }
    }
}

/// Command type byte, always the first byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandTag {
    Null = 0x00,
    VersionCheck = 0x01,
    CreateActor = 0x02,
    DestroyActor = 0x03,
    SendMessage = 0x04,
    SendReply = 0x05,
}

/// How a field's length is declared on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// Single length byte, field of at most 255 bytes
    U8,
    /// Four byte big-endian length
    U32,
}

/// A named field in a command's wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    VersionToken,
    ActorUuid,
    TypeName,
    BehaviorName,
    Payload,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::VersionToken => "version_token",
            Field::ActorUuid => "actor_uuid",
            Field::TypeName => "type_name",
            Field::BehaviorName => "behavior_name",
            Field::Payload => "payload",
        }
    }

    pub fn prefix(self) -> LengthPrefix {
        match self {
            Field::Payload => LengthPrefix::U32,
            _ => LengthPrefix::U8,
        }
    }

    /// Whether the field carries text that must be valid UTF-8
    pub fn is_text(self) -> bool {
        !matches!(self, Field::Payload)
    }
}

impl CommandTag {
    /// Fields that follow the tag byte, in wire order
    pub fn layout(self) -> &'static [Field] {
        match self {
            CommandTag::Null => &[],
            CommandTag::VersionCheck => &[Field::VersionToken],
            CommandTag::CreateActor => &[Field::ActorUuid, Field::TypeName],
            CommandTag::DestroyActor => &[Field::ActorUuid],
            CommandTag::SendMessage => &[Field::ActorUuid, Field::BehaviorName, Field::Payload],
            CommandTag::SendReply => &[Field::ActorUuid, Field::Payload],
        }
    }

    /// The only role allowed to send this command, `None` for the idle sentinel
    pub fn sender(self) -> Option<Role> {
        match self {
            CommandTag::Null => None,
            CommandTag::SendReply => Some(Role::Slave),
            CommandTag::VersionCheck
            | CommandTag::CreateActor
            | CommandTag::DestroyActor
            | CommandTag::SendMessage => Some(Role::Master),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandTag::Null => "Null",
            CommandTag::VersionCheck => "VersionCheck",
            CommandTag::CreateActor => "CreateActor",
            CommandTag::DestroyActor => "DestroyActor",
            CommandTag::SendMessage => "SendMessage",
            CommandTag::SendReply => "SendReply",
        }
    }

    /// Resolve a raw tag byte, rejecting anything this build does not know
    pub fn from_byte(tag: u8) -> ProtocolResult<Self> {
        CommandTag::try_from(tag).map_err(|_| ProtocolError::unknown_command(tag))
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build compatibility handshake, first frame a master sends
    VersionCheck { token: String },
    /// Instantiate an actor of `type_name` and address it as `actor_uuid`
    CreateActor {
        actor_uuid: String,
        type_name: String,
    },
    /// Release the actor addressed by `actor_uuid`
    DestroyActor { actor_uuid: String },
    /// Deliver `payload` to the actor's `behavior_name` handler
    SendMessage {
        actor_uuid: String,
        behavior_name: String,
        payload: Bytes,
    },
    /// Reply produced by a slave-hosted actor
    SendReply { actor_uuid: String, payload: Bytes },
    /// No command read; also what a clean end-of-stream decodes to
    Null,
}

impl Command {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::VersionCheck { .. } => CommandTag::VersionCheck,
            Command::CreateActor { .. } => CommandTag::CreateActor,
            Command::DestroyActor { .. } => CommandTag::DestroyActor,
            Command::SendMessage { .. } => CommandTag::SendMessage,
            Command::SendReply { .. } => CommandTag::SendReply,
            Command::Null => CommandTag::Null,
        }
    }

    /// Actor this command addresses, if any
    pub fn actor_uuid(&self) -> Option<&str> {
        match self {
            Command::CreateActor { actor_uuid, .. }
            | Command::DestroyActor { actor_uuid }
            | Command::SendMessage { actor_uuid, .. }
            | Command::SendReply { actor_uuid, .. } => Some(actor_uuid),
            Command::VersionCheck { .. } | Command::Null => None,
        }
    }

    /// Field contents in the order given by [`CommandTag::layout`]
    pub fn field_bytes(&self) -> Vec<&[u8]> {
        match self {
            Command::VersionCheck { token } => vec![token.as_bytes()],
            Command::CreateActor {
                actor_uuid,
                type_name,
            } => vec![actor_uuid.as_bytes(), type_name.as_bytes()],
            Command::DestroyActor { actor_uuid } => vec![actor_uuid.as_bytes()],
            Command::SendMessage {
                actor_uuid,
                behavior_name,
                payload,
            } => vec![actor_uuid.as_bytes(), behavior_name.as_bytes(), payload.as_ref()],
            Command::SendReply {
                actor_uuid,
                payload,
            } => vec![actor_uuid.as_bytes(), payload.as_ref()],
            Command::Null => Vec::new(),
        }
    }

    /// Rebuild a command from raw fields read in layout order
    pub fn from_fields(tag: CommandTag, fields: Vec<Bytes>) -> ProtocolResult<Self> {
        let layout = tag.layout();
        if fields.len() != layout.len() {
            return Err(ProtocolError::field_count(tag.name(), layout.len(), fields.len()));
        }

        let mut fields = fields.into_iter().zip(layout.iter().copied());

        let command = match tag {
            CommandTag::Null => Command::Null,
            CommandTag::VersionCheck => Command::VersionCheck {
                token: next_text(&mut fields, tag)?,
            },
            CommandTag::CreateActor => Command::CreateActor {
                actor_uuid: next_text(&mut fields, tag)?,
                type_name: next_text(&mut fields, tag)?,
            },
            CommandTag::DestroyActor => Command::DestroyActor {
                actor_uuid: next_text(&mut fields, tag)?,
            },
            CommandTag::SendMessage => Command::SendMessage {
                actor_uuid: next_text(&mut fields, tag)?,
                behavior_name: next_text(&mut fields, tag)?,
                payload: next_payload(&mut fields, tag)?,
            },
            CommandTag::SendReply => Command::SendReply {
                actor_uuid: next_text(&mut fields, tag)?,
                payload: next_payload(&mut fields, tag)?,
            },
        };
        Ok(command)
    }

    /// Reject a command that arrived from a role not allowed to send it
    pub fn check_sender(&self, sender: Role) -> ProtocolResult<()> {
        match self.tag().sender() {
            Some(expected) if expected != sender => {
                Err(ProtocolError::wrong_direction(self.tag().name(), sender))
            }
            _ => Ok(()),
        }
    }
}

fn next_text(
    fields: &mut impl Iterator<Item = (Bytes, Field)>,
    tag: CommandTag,
) -> ProtocolResult<String> {
    let (bytes, field) = fields
        .next()
        .ok_or_else(|| ProtocolError::field_count(tag.name(), tag.layout().len(), 0))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::invalid_utf8(field.name()))
}

fn next_payload(
    fields: &mut impl Iterator<Item = (Bytes, Field)>,
    tag: CommandTag,
) -> ProtocolResult<Bytes> {
    fields
        .next()
        .map(|(bytes, _)| bytes)
        .ok_or_else(|| ProtocolError::field_count(tag.name(), tag.layout().len(), 0))
}
