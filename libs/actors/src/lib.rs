//! Remote Actor Protocol
//!
//! Extends a process-local actor runtime across TCP links. A master creates,
//! messages and destroys actors that execute on one or more slaves; slaves
//! host them through the [`LocalRuntime`] seam and send replies back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │        Master        │              │        Slave         │
//! │                      │  VersionCheck│                      │
//! │ remote_create_actor ─┼──CreateActor─┼─► LocalRuntime       │
//! │ remote_send ─────────┼──SendMessage─┼─► dispatch           │
//! │ remote_destroy_actor─┼──DestroyActor┼─► destroy_actor      │
//! │ ReplyHandler ◄───────┼──SendReply───┼── ReplySink          │
//! │                      │              │                      │
//! │ MasterRegistry       │              │ SlaveRegistry        │
//! │ uuid → connection    │              │ uuid → handle        │
//! └──────────────────────┘              └──────────────────────┘
//!            └────────── RemoteRuntime::shutdown ─────┘
//! ```
//!
//! Each link is served by one sequential receive loop, so frames on a link are
//! handled in arrival order. No command is retried; delivery is at most once
//! per attempt.

pub mod config;
pub mod error;
mod link;
pub mod local;
pub mod master;
pub mod registry;
pub mod slave;
pub mod system;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use config::RemoteConfig;
pub use error::{RemoteError, Result};
pub use local::{
    ActorTypeRegistry, LocalRuntime, MailboxHandle, MailboxRuntime, RemoteActor, ReplySink,
    RuntimeError,
};
pub use master::{ChannelReplyHandler, LinkInfo, Master, MasterEvent, ReplyHandler};
pub use registry::{
    ActorUuid, IdentityRegistry, MasterRegistry, SlaveRegistry, GENERATED_UUID_LEN,
};
pub use slave::Slave;
pub use system::RemoteRuntime;
pub use version::VersionToken;

pub use network::ConnectionId;
