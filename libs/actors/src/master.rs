//! Master Role
//!
//! Originates actor lifecycle and messaging requests. Each slave link starts
//! with a one-way `VersionCheck` and is ready as soon as that frame is queued;
//! a slave that disagrees simply closes the link, which surfaces here as link
//! loss.
//!
//! Requests are fire-and-forget. Creating an actor records its identifier
//! against the chosen link before `CreateActor` is sent; destroying removes it
//! before `DestroyActor` is sent; a message for an identifier that is no longer
//! known is dropped. Replies are matched to actors by identifier only, so
//! callers with several requests in flight to one actor must correlate replies
//! themselves.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::link::{next_command, LinkHandle, LinkTable, TaskSet};
use crate::registry::{ActorUuid, MasterRegistry};
use bytes::Bytes;
use codec::{Command, Role};
use network::{ConnectionId, FrameReader, Link};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Receives what slaves send back
pub trait ReplyHandler: Send + Sync + 'static {
    /// A slave actor produced a reply
    fn on_reply(&self, actor_uuid: &str, payload: Bytes);

    /// A link closed; `orphaned` lists the actors that lived on it
    fn on_link_lost(&self, _connection: ConnectionId, _orphaned: &[ActorUuid]) {}
}

/// Event delivered by [`ChannelReplyHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterEvent {
    Reply { actor_uuid: String, payload: Bytes },
    LinkLost { connection: ConnectionId, orphaned: Vec<ActorUuid> },
}

/// [`ReplyHandler`] that forwards everything into an mpsc channel
pub struct ChannelReplyHandler {
    events: mpsc::UnboundedSender<MasterEvent>,
}

impl ChannelReplyHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MasterEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl ReplyHandler for ChannelReplyHandler {
    fn on_reply(&self, actor_uuid: &str, payload: Bytes) {
        let _ = self.events.send(MasterEvent::Reply {
            actor_uuid: actor_uuid.to_string(),
            payload,
        });
    }

    fn on_link_lost(&self, connection: ConnectionId, orphaned: &[ActorUuid]) {
        let _ = self.events.send(MasterEvent::LinkLost {
            connection,
            orphaned: orphaned.to_vec(),
        });
    }
}

/// Snapshot of one master link
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub connection: ConnectionId,
    pub peer: String,
    pub remote_actors: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

struct MasterInner {
    config: RemoteConfig,
    links: LinkTable,
    registry: MasterRegistry,
    replies: Arc<dyn ReplyHandler>,
    tasks: TaskSet,
    acceptors: TaskSet,
    shutting_down: AtomicBool,
    done: watch::Sender<bool>,
}

/// Master side of the remote actor protocol
#[derive(Clone)]
pub struct Master {
    inner: Arc<MasterInner>,
}

impl Master {
    pub fn new(config: RemoteConfig, replies: Arc<dyn ReplyHandler>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(MasterInner {
                config,
                links: LinkTable::default(),
                registry: MasterRegistry::new(),
                replies,
                tasks: TaskSet::default(),
                acceptors: TaskSet::default(),
                shutting_down: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Dial a slave and start the handshake
    pub async fn connect(&self, addr: SocketAddr) -> Result<ConnectionId> {
        self.inner.ensure_running()?;
        let link = network::dial(addr, &self.inner.config.link).await?;
        self.attach(link)
    }

    /// Accept slaves that dial in; returns the bound address
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        self.inner.ensure_running()?;
        let listener = network::bind(addr).await?;
        let local = listener.local_addr().map_err(network::TransportError::from)?;
        let master = self.clone();
        self.inner.acceptors.spawn(async move { master.accept_loop(listener).await });
        Ok(local)
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match network::accept(&listener, &self.inner.config.link).await {
                Ok(link) => {
                    if let Err(e) = self.attach(link) {
                        warn!(error = %e, "Failed to attach incoming slave link");
                    }
                }
                Err(e) => {
                    warn!(error = %e, error_category = e.category(), "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Adopt an established stream as a slave link
    pub fn attach<R, W>(&self, link: Link<R, W>) -> Result<ConnectionId>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let inner = &self.inner;
        inner.ensure_running()?;

        let (link, reader) = LinkHandle::open(link, &inner.tasks);
        let token = inner.config.version_token.as_str().to_string();
        if let Err(e) = link.send(&Command::VersionCheck { token }) {
            link.close();
            return Err(e);
        }
        inner.links.insert(link.clone());
        // Lost a race with shutdown, which may already have swept the table
        if inner.shutting_down.load(Ordering::SeqCst) {
            link.close();
        }
        info!(connection = %link.id, peer = %link.peer, "Master link ready, version check sent");

        let id = link.id;
        let task_inner = inner.clone();
        inner
            .tasks
            .spawn(async move { task_inner.receive_loop(link, reader).await });
        Ok(id)
    }

    /// Create an actor on the least loaded slave link
    ///
    /// `uuid_hint` is used verbatim when given; otherwise a random identifier
    /// is generated.
    pub fn remote_create_actor(
        &self,
        uuid_hint: Option<&str>,
        type_name: &str,
    ) -> Result<ActorUuid> {
        self.inner.ensure_running()?;
        let link = self.inner.place()?;
        self.inner.create_on(&link, uuid_hint, type_name)
    }

    /// Create an actor on a specific link
    pub fn remote_create_actor_on(
        &self,
        connection: ConnectionId,
        uuid_hint: Option<&str>,
        type_name: &str,
    ) -> Result<ActorUuid> {
        self.inner.ensure_running()?;
        let link = self
            .inner
            .links
            .get(connection)
            .filter(|link| !link.is_closed())
            .ok_or_else(|| RemoteError::UnknownConnection {
                connection: connection.to_string(),
            })?;
        self.inner.create_on(&link, uuid_hint, type_name)
    }

    /// Forget an actor and tell its slave to destroy it
    ///
    /// Returns `false` if the identifier was not known.
    pub fn remote_destroy_actor(&self, actor_uuid: &str) -> Result<bool> {
        self.inner.ensure_running()?;
        let Some((uuid, connection, _)) = self.inner.registry.remove(actor_uuid) else {
            debug!(actor = actor_uuid, "Destroy for unknown actor ignored");
            return Ok(false);
        };
        if let Some(link) = self.inner.links.get(connection) {
            let command = Command::DestroyActor {
                actor_uuid: uuid.to_string(),
            };
            if let Err(e) = link.send(&command) {
                debug!(actor = %uuid, %connection, error = %e, "DestroyActor not delivered");
            }
        }
        Ok(true)
    }

    /// Send a message to a remote actor
    ///
    /// Returns `false` when the message was dropped because the actor or its
    /// link is gone.
    pub fn remote_send(
        &self,
        actor_uuid: &str,
        behavior: &str,
        payload: impl Into<Bytes>,
    ) -> Result<bool> {
        self.inner.ensure_running()?;
        let Some(connection) = self.inner.registry.connection_of(actor_uuid) else {
            debug!(actor = actor_uuid, behavior, "Message for unknown actor dropped");
            return Ok(false);
        };
        let Some(link) = self.inner.links.get(connection) else {
            return Ok(false);
        };
        let command = Command::SendMessage {
            actor_uuid: actor_uuid.to_string(),
            behavior_name: behavior.to_string(),
            payload: payload.into(),
        };
        match link.send(&command) {
            Ok(()) => Ok(true),
            Err(RemoteError::Transport(e)) if e.is_closed() => {
                debug!(actor = actor_uuid, %connection, "Message dropped, link closing");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn link_count(&self) -> usize {
        self.inner.links.len()
    }

    pub fn remote_actor_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Connection an actor lives on
    pub fn connection_of(&self, actor_uuid: &str) -> Option<ConnectionId> {
        self.inner.registry.connection_of(actor_uuid)
    }

    pub fn links(&self) -> Vec<LinkInfo> {
        let counts = self.inner.registry.count_by_connection();
        self.inner
            .links
            .open_links()
            .into_iter()
            .map(|link| {
                let stats = link.stats().snapshot();
                LinkInfo {
                    connection: link.id,
                    peer: link.peer.clone(),
                    remote_actors: counts.get(&link.id).copied().unwrap_or(0),
                    bytes_sent: stats.bytes_sent,
                    bytes_received: stats.bytes_received,
                }
            })
            .collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Close every link and wait for their receive loops; safe to call repeatedly
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutting_down.swap(true, Ordering::SeqCst) {
            let mut done = inner.done.subscribe();
            let _ = done.wait_for(|done| *done).await;
            return;
        }

        info!(links = inner.links.len(), "Shutting down master");
        inner.acceptors.abort_all();
        let closed = inner.links.close_all();
        inner.tasks.join_all().await;

        let forgotten = inner.registry.drain().len();
        inner.done.send_replace(true);
        info!(closed_links = closed, forgotten_actors = forgotten, "Master shutdown complete");
    }
}

impl MasterInner {
    fn ensure_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RemoteError::ShutDown);
        }
        Ok(())
    }

    /// Open link with the fewest live actors, lowest id on ties
    fn place(&self) -> Result<Arc<LinkHandle>> {
        let counts = self.registry.count_by_connection();
        self.links
            .open_links()
            .into_iter()
            .min_by_key(|link| (counts.get(&link.id).copied().unwrap_or(0), link.id))
            .ok_or(RemoteError::NoSlaveAvailable)
    }

    fn create_on(
        &self,
        link: &LinkHandle,
        uuid_hint: Option<&str>,
        type_name: &str,
    ) -> Result<ActorUuid> {
        let uuid = match uuid_hint {
            Some(hint) => ActorUuid::parse(hint)?,
            None => ActorUuid::generate(),
        };
        if self
            .registry
            .insert(uuid.clone(), link.id, type_name.to_string())
            .is_err()
        {
            return Err(RemoteError::invalid_identifier(uuid, "already registered"));
        }

        let command = Command::CreateActor {
            actor_uuid: uuid.to_string(),
            type_name: type_name.to_string(),
        };
        if let Err(e) = link.send(&command) {
            self.registry.remove(uuid.as_str());
            return Err(e);
        }
        debug!(actor = %uuid, connection = %link.id, type_name, "Remote actor created");
        Ok(uuid)
    }

    async fn receive_loop<R>(self: Arc<Self>, link: Arc<LinkHandle>, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        let mut closed = link.closed_signal();
        while let Some(command) = next_command(&link, &mut reader, &mut closed).await {
            if let Err(e) = command.check_sender(Role::Slave) {
                warn!(
                    connection = %link.id,
                    peer = %link.peer,
                    error = %e,
                    "Protocol violation, closing link"
                );
                break;
            }
            if let Command::SendReply { actor_uuid, payload } = command {
                self.route_reply(&link, &actor_uuid, payload);
            }
        }
        self.link_closed(&link);
    }

    fn route_reply(&self, link: &LinkHandle, actor_uuid: &str, payload: Bytes) {
        match self.registry.connection_of(actor_uuid) {
            Some(connection) if connection == link.id => {
                debug!(actor = actor_uuid, bytes = payload.len(), "Reply received");
                self.replies.on_reply(actor_uuid, payload);
            }
            Some(connection) => {
                warn!(
                    actor = actor_uuid,
                    expected = %connection,
                    received_on = %link.id,
                    "Reply arrived on the wrong link, dropped"
                );
            }
            None => {
                debug!(
                    actor = actor_uuid,
                    connection = %link.id,
                    "Reply for unknown actor dropped"
                );
            }
        }
    }

    fn link_closed(&self, link: &LinkHandle) {
        link.close();
        self.links.remove(link.id);
        let orphaned: Vec<ActorUuid> = self
            .registry
            .remove_connection(link.id)
            .into_iter()
            .map(|(uuid, _)| uuid)
            .collect();

        let stats = link.stats().snapshot();
        info!(
            connection = %link.id,
            peer = %link.peer,
            orphaned = orphaned.len(),
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            "Master link closed"
        );
        self.replies.on_link_lost(link.id, &orphaned);
    }
}
