//! Local Runtime Seam
//!
//! The slave role never runs actors itself. It asks a [`LocalRuntime`] to
//! instantiate, message and destroy them, and hands each new actor a
//! [`ReplySink`] through which its replies travel back to the master over the
//! connection that created it.
//!
//! [`MailboxRuntime`] is the in-tree runtime: one tokio task and one unbounded
//! mailbox per actor, with actor types looked up in an [`ActorTypeRegistry`].

use crate::error::{RemoteError, Result};
use crate::link::Outbound;
use crate::registry::ActorUuid;
use async_trait::async_trait;
use bytes::Bytes;
use codec::Command;
use network::ConnectionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Failures reported by a local runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unknown actor type '{type_name}'")]
    UnknownType { type_name: String },

    #[error("Actor allocation failed: {message}")]
    Allocation { message: String },
}

impl From<RuntimeError> for RemoteError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::UnknownType { type_name } => RemoteError::UnknownActorType { type_name },
            RuntimeError::Allocation { message } => RemoteError::ActorCreation { message },
        }
    }
}

/// Operations the slave role needs from the process-local actor runtime
pub trait LocalRuntime: Send + Sync + 'static {
    /// Opaque, move-only reference to one live actor
    type Handle: Send + Sync + 'static;

    fn create_actor(
        &self,
        type_name: &str,
        replies: ReplySink,
    ) -> std::result::Result<Self::Handle, RuntimeError>;

    /// Release an actor; called exactly once per handle
    fn destroy_actor(&self, handle: Self::Handle);

    /// Queue a message; must not block
    fn dispatch(&self, handle: &Self::Handle, behavior: &str, payload: Bytes);

    fn pending_message_count(&self, handle: &Self::Handle) -> usize;
}

/// Route from an actor back to the master that created it
#[derive(Clone)]
pub struct ReplySink {
    uuid: ActorUuid,
    outbound: Outbound,
}

impl ReplySink {
    pub(crate) fn new(uuid: ActorUuid, outbound: Outbound) -> Self {
        Self { uuid, outbound }
    }

    /// Sink whose frames land in the returned receiver instead of a socket
    #[cfg(any(test, feature = "test-support"))]
    pub fn detached(uuid: ActorUuid) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, frames) = Outbound::detached(codec::FrameCodec::default());
        (Self::new(uuid, outbound), frames)
    }

    pub fn uuid(&self) -> &ActorUuid {
        &self.uuid
    }

    pub fn connection(&self) -> ConnectionId {
        self.outbound.connection()
    }

    pub fn is_open(&self) -> bool {
        self.outbound.is_open()
    }

    /// Queue a `SendReply` for this actor
    ///
    /// Fails if the payload exceeds the link's limits or the link has closed;
    /// nothing is queued in either case.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.outbound.send(&Command::SendReply {
            actor_uuid: self.uuid.to_string(),
            payload: payload.into(),
        })
    }
}

impl fmt::Debug for ReplySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySink")
            .field("uuid", &self.uuid)
            .field("connection", &self.connection())
            .finish()
    }
}

/// Behavior of an actor hosted by [`MailboxRuntime`]
#[async_trait]
pub trait RemoteActor: Send + 'static {
    /// Handle one message tagged with its behavior name
    async fn receive(&mut self, behavior: &str, payload: Bytes, replies: &ReplySink);

    /// Called before the first message
    async fn on_start(&mut self, _replies: &ReplySink) {}

    /// Called after the mailbox is closed and drained
    async fn on_stop(&mut self) {}
}

type Constructor = Box<dyn Fn() -> Box<dyn RemoteActor> + Send + Sync>;

/// Actor type name to constructor
#[derive(Default)]
pub struct ActorTypeRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl ActorTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `type_name`, replacing any previous entry
    pub fn register<F, A>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: RemoteActor,
    {
        let type_name = type_name.into();
        debug!(type_name = %type_name, "Registering actor type");
        self.constructors
            .write()
            .insert(type_name, Box::new(move || Box::new(constructor()) as Box<dyn RemoteActor>));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn construct(&self, type_name: &str) -> Option<Box<dyn RemoteActor>> {
        self.constructors.read().get(type_name).map(|constructor| constructor())
    }
}

struct Envelope {
    behavior: String,
    payload: Bytes,
}

/// Handle to an actor running under [`MailboxRuntime`]
pub struct MailboxHandle {
    uuid: ActorUuid,
    mailbox: mpsc::UnboundedSender<Envelope>,
    pending: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MailboxHandle {
    pub fn uuid(&self) -> &ActorUuid {
        &self.uuid
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Task-per-actor runtime built on an [`ActorTypeRegistry`]
pub struct MailboxRuntime {
    types: Arc<ActorTypeRegistry>,
    live: AtomicUsize,
}

impl MailboxRuntime {
    pub fn new(types: Arc<ActorTypeRegistry>) -> Self {
        Self {
            types,
            live: AtomicUsize::new(0),
        }
    }

    pub fn types(&self) -> &Arc<ActorTypeRegistry> {
        &self.types
    }

    /// Actors created and not yet destroyed
    pub fn live_actor_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl LocalRuntime for MailboxRuntime {
    type Handle = MailboxHandle;

    fn create_actor(
        &self,
        type_name: &str,
        replies: ReplySink,
    ) -> std::result::Result<MailboxHandle, RuntimeError> {
        let actor = self.types.construct(type_name).ok_or_else(|| RuntimeError::UnknownType {
            type_name: type_name.to_string(),
        })?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| RuntimeError::Allocation {
            message: e.to_string(),
        })?;

        let (mailbox, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let uuid = replies.uuid().clone();
        let task = runtime.spawn(run_actor(actor, rx, replies, pending.clone()));

        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(MailboxHandle {
            uuid,
            mailbox,
            pending,
            task,
        })
    }

    fn destroy_actor(&self, handle: MailboxHandle) {
        // Dropping the sender lets the actor drain its mailbox and stop
        let MailboxHandle { uuid, mailbox, .. } = handle;
        drop(mailbox);
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(actor = %uuid, "Actor mailbox closed");
    }

    fn dispatch(&self, handle: &MailboxHandle, behavior: &str, payload: Bytes) {
        handle.pending.fetch_add(1, Ordering::AcqRel);
        let envelope = Envelope {
            behavior: behavior.to_string(),
            payload,
        };
        if handle.mailbox.send(envelope).is_err() {
            handle.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(actor = %handle.uuid, behavior, "Actor task has stopped, message dropped");
        }
    }

    fn pending_message_count(&self, handle: &MailboxHandle) -> usize {
        handle.pending.load(Ordering::Acquire)
    }
}

async fn run_actor(
    mut actor: Box<dyn RemoteActor>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
    replies: ReplySink,
    pending: Arc<AtomicUsize>,
) {
    actor.on_start(&replies).await;
    while let Some(envelope) = mailbox.recv().await {
        pending.fetch_sub(1, Ordering::AcqRel);
        actor.receive(&envelope.behavior, envelope.payload, &replies).await;
    }
    actor.on_stop().await;
    debug!(actor = %replies.uuid(), "Actor stopped");
}
