//! # Remote Actor Protocol Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the remote actor protocol:
//! - The closed command vocabulary and each command's authorized sender role
//! - The wire layout of every frame (tag byte, then length-prefixed fields)
//! - Encoding and decoding of frames as pure byte-buffer transforms
//! - Length limits that bound every declared size before bytes are copied
//!
//! ## Architecture Role
//!
//! ```text
//! remote-actors → [codec] → network
//!       ↑            ↓          ↓
//!  Master/Slave   Command     Sockets
//!  state machines Framing     Frame reader/writer
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket reads or writes (belongs in network/)
//! - Actor bookkeeping or dispatch (belongs in libs/actors)

pub mod command;
pub mod error;
pub mod frame;
pub mod limits;

pub use command::{Command, CommandTag, Field, LengthPrefix, Role};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{encoded_len, FrameCodec, TAG_LEN};
pub use limits::{FrameLimits, DEFAULT_MAX_PAYLOAD_LEN};
