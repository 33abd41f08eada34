//! Slave Role
//!
//! Hosts actors on behalf of masters. Each link runs its own receive loop and
//! state machine:
//!
//! ```text
//! AwaitingVersionCheck ──VersionCheck(match)──► Ready ──► Closed
//!          │                                      │
//!          └─ anything else / mismatch ─► Closed ◄┘ violation, EOF, shutdown
//! ```
//!
//! Frames on one link are handled strictly in arrival order. Unknown actors,
//! unknown types and failed creations drop the single command; violations of
//! the protocol close the link. When a link closes, every actor created on it
//! is destroyed.
//!
//! The registry lock only covers lookups. Runtime calls are made on a cloned
//! [`Hosted`] reference after the lock is released, and the handle goes back
//! to the runtime when the last reference drops.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::link::{next_command, LinkHandle, LinkTable, TaskSet};
use crate::local::{LocalRuntime, ReplySink};
use crate::registry::{ActorUuid, SlaveRegistry};
use bytes::Bytes;
use codec::{Command, Role};
use network::{ConnectionId, FrameReader, Link};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    AwaitingVersionCheck,
    Ready,
}

/// One live actor; released to its runtime exactly once, on last drop
struct Hosted<RT: LocalRuntime> {
    runtime: Arc<RT>,
    handle: Option<RT::Handle>,
}

impl<RT: LocalRuntime> Hosted<RT> {
    fn new(runtime: Arc<RT>, handle: RT::Handle) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            handle: Some(handle),
        })
    }

    /// Queue a message and report the mailbox depth
    fn dispatch(&self, behavior: &str, payload: Bytes) -> usize {
        match &self.handle {
            Some(handle) => {
                self.runtime.dispatch(handle, behavior, payload);
                self.runtime.pending_message_count(handle)
            }
            None => 0,
        }
    }

    fn pending(&self) -> usize {
        self.handle
            .as_ref()
            .map_or(0, |handle| self.runtime.pending_message_count(handle))
    }
}

impl<RT: LocalRuntime> Drop for Hosted<RT> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.destroy_actor(handle);
        }
    }
}

struct SlaveInner<RT: LocalRuntime> {
    config: RemoteConfig,
    runtime: Arc<RT>,
    links: LinkTable,
    registry: SlaveRegistry<Arc<Hosted<RT>>>,
    tasks: TaskSet,
    acceptors: TaskSet,
    shutting_down: AtomicBool,
    done: watch::Sender<bool>,
}

/// Slave side of the remote actor protocol
pub struct Slave<RT: LocalRuntime> {
    inner: Arc<SlaveInner<RT>>,
}

impl<RT: LocalRuntime> Clone for Slave<RT> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<RT: LocalRuntime> Slave<RT> {
    pub fn new(config: RemoteConfig, runtime: Arc<RT>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(SlaveInner {
                config,
                runtime,
                links: LinkTable::default(),
                registry: SlaveRegistry::new(),
                tasks: TaskSet::default(),
                acceptors: TaskSet::default(),
                shutting_down: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Accept masters; returns the bound address
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        self.inner.ensure_running()?;
        let listener = network::bind(addr).await?;
        let local = listener.local_addr().map_err(network::TransportError::from)?;
        let slave = self.clone();
        self.inner.acceptors.spawn(async move { slave.accept_loop(listener).await });
        Ok(local)
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match network::accept(&listener, &self.inner.config.link).await {
                Ok(link) => {
                    if let Err(e) = self.attach(link) {
                        warn!(error = %e, "Failed to attach incoming master link");
                    }
                }
                Err(e) => {
                    warn!(error = %e, error_category = e.category(), "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Dial a master and wait for its version check
    pub async fn connect(&self, addr: SocketAddr) -> Result<ConnectionId> {
        self.inner.ensure_running()?;
        let link = network::dial(addr, &self.inner.config.link).await?;
        self.attach(link)
    }

    /// Adopt an established stream as a master link
    pub fn attach<R, W>(&self, link: Link<R, W>) -> Result<ConnectionId>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let inner = &self.inner;
        inner.ensure_running()?;

        let (link, reader) = LinkHandle::open(link, &inner.tasks);
        inner.links.insert(link.clone());
        if inner.shutting_down.load(Ordering::SeqCst) {
            link.close();
        }
        debug!(connection = %link.id, peer = %link.peer, "Slave link awaiting version check");

        let id = link.id;
        let task_inner = inner.clone();
        inner
            .tasks
            .spawn(async move { task_inner.receive_loop(link, reader).await });
        Ok(id)
    }

    pub fn runtime(&self) -> &Arc<RT> {
        &self.inner.runtime
    }

    pub fn link_count(&self) -> usize {
        self.inner.links.len()
    }

    /// Actors currently hosted for any master
    pub fn actor_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn hosts(&self, actor_uuid: &str) -> bool {
        self.inner.registry.contains(actor_uuid)
    }

    /// Messages queued for an actor and not yet processed
    pub fn pending_messages(&self, actor_uuid: &str) -> Option<usize> {
        let actor = self.inner.registry.get(actor_uuid)?;
        Some(actor.pending())
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Close every link, wait for the receive loops and destroy every hosted
    /// actor; safe to call repeatedly
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutting_down.swap(true, Ordering::SeqCst) {
            let mut done = inner.done.subscribe();
            let _ = done.wait_for(|done| *done).await;
            return;
        }

        info!(links = inner.links.len(), actors = inner.registry.len(), "Shutting down slave");
        inner.acceptors.abort_all();
        let closed = inner.links.close_all();
        inner.tasks.join_all().await;

        // Receive loops destroy their own actors; this catches any left behind
        let leftover = inner.registry.drain();
        let destroyed = leftover.len();
        drop(leftover);
        inner.done.send_replace(true);
        info!(closed_links = closed, destroyed_actors = destroyed, "Slave shutdown complete");
    }
}

impl<RT: LocalRuntime> SlaveInner<RT> {
    fn ensure_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RemoteError::ShutDown);
        }
        Ok(())
    }

    async fn receive_loop<R>(self: Arc<Self>, link: Arc<LinkHandle>, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        let mut state = LinkState::AwaitingVersionCheck;
        let mut closed = link.closed_signal();
        while let Some(command) = next_command(&link, &mut reader, &mut closed).await {
            let tag = command.tag();
            match self.handle(&link, &mut state, command) {
                Ok(()) => {}
                Err(e) if e.is_connection_fatal() => {
                    warn!(
                        connection = %link.id,
                        peer = %link.peer,
                        command = %tag,
                        error = %e,
                        error_category = e.category(),
                        "Closing link"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        connection = %link.id,
                        command = %tag,
                        error = %e,
                        error_category = e.category(),
                        "Command dropped"
                    );
                }
            }
        }
        self.link_closed(&link);
    }

    fn handle(&self, link: &LinkHandle, state: &mut LinkState, command: Command) -> Result<()> {
        command.check_sender(Role::Master)?;

        match (*state, command) {
            (_, Command::VersionCheck { token }) => {
                let expected = &self.config.version_token;
                if !expected.matches(&token) {
                    return Err(RemoteError::version_mismatch(expected.as_str(), token));
                }
                if *state == LinkState::AwaitingVersionCheck {
                    info!(
                        connection = %link.id,
                        peer = %link.peer,
                        "Version check passed, link ready"
                    );
                }
                *state = LinkState::Ready;
                Ok(())
            }
            (LinkState::AwaitingVersionCheck, other) => Err(RemoteError::HandshakeRequired {
                command: other.tag().name(),
            }),
            (LinkState::Ready, Command::CreateActor { actor_uuid, type_name }) => {
                self.create_actor(link, actor_uuid, &type_name)
            }
            (LinkState::Ready, Command::DestroyActor { actor_uuid }) => {
                self.destroy_actor(&actor_uuid)
            }
            (
                LinkState::Ready,
                Command::SendMessage {
                    actor_uuid,
                    behavior_name,
                    payload,
                },
            ) => self.dispatch(&actor_uuid, &behavior_name, payload),
            // SendReply fails the direction check and Null never leaves next_command
            (LinkState::Ready, Command::SendReply { .. } | Command::Null) => Ok(()),
        }
    }

    fn create_actor(&self, link: &LinkHandle, actor_uuid: String, type_name: &str) -> Result<()> {
        let uuid = ActorUuid::parse(actor_uuid)?;
        if self.registry.contains(uuid.as_str()) {
            return Err(RemoteError::invalid_identifier(uuid, "already live on this slave"));
        }

        let replies = ReplySink::new(uuid.clone(), link.outbound());
        let handle = self.runtime.create_actor(type_name, replies)?;
        let actor = Hosted::new(self.runtime.clone(), handle);
        if self.registry.insert(uuid.clone(), link.id, actor).is_err() {
            return Err(RemoteError::invalid_identifier(uuid, "already live on this slave"));
        }
        info!(connection = %link.id, actor = %uuid, type_name, "Actor created");
        Ok(())
    }

    fn destroy_actor(&self, actor_uuid: &str) -> Result<()> {
        let (uuid, connection, actor) = self
            .registry
            .remove(actor_uuid)
            .ok_or_else(|| RemoteError::unknown_actor(actor_uuid))?;
        drop(actor);
        info!(%connection, actor = %uuid, "Actor destroyed");
        Ok(())
    }

    fn dispatch(&self, actor_uuid: &str, behavior: &str, payload: Bytes) -> Result<()> {
        let actor = self
            .registry
            .get(actor_uuid)
            .ok_or_else(|| RemoteError::unknown_actor(actor_uuid))?;
        let pending = actor.dispatch(behavior, payload);
        trace!(actor = actor_uuid, behavior, pending, "Message dispatched");
        Ok(())
    }

    fn link_closed(&self, link: &LinkHandle) {
        link.close();
        self.links.remove(link.id);
        let orphaned = self.registry.remove_connection(link.id);
        let destroyed = orphaned.len();
        for (uuid, actor) in orphaned {
            debug!(connection = %link.id, actor = %uuid, "Destroying actor of closed link");
            drop(actor);
        }

        let stats = link.stats().snapshot();
        info!(
            connection = %link.id,
            peer = %link.peer,
            destroyed_actors = destroyed,
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            "Slave link closed"
        );
    }
}
