//! Per-connection plumbing shared by the master and slave roles
//!
//! Every open link gets a writer task fed through an unbounded queue of
//! encoded frames, plus one sequential receive loop owned by the role. Frames
//! are encoded on the caller's side of the queue so oversized commands are
//! refused synchronously and never reach the socket.

use crate::error::Result;
use bytes::Bytes;
use codec::{Command, FrameCodec};
use network::{
    ConnectionId, ConnectionStats, FrameReader, FrameWriter, Link, ShutdownHandle, TransportError,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue of encoded frames bound for one connection
#[derive(Clone)]
pub(crate) struct Outbound {
    connection: ConnectionId,
    codec: FrameCodec,
    frames: mpsc::UnboundedSender<Bytes>,
    closed: watch::Receiver<bool>,
}

impl Outbound {
    pub(crate) fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub(crate) fn is_open(&self) -> bool {
        !*self.closed.borrow() && !self.frames.is_closed()
    }

    /// Encode `command` and queue it behind every frame sent before it
    pub(crate) fn send(&self, command: &Command) -> Result<()> {
        if *self.closed.borrow() {
            let context = format!("{} is closed", self.connection);
            return Err(TransportError::connection_closed(context).into());
        }
        let frame = self.codec.encode(command)?;
        self.frames.send(frame).map_err(|_| {
            TransportError::connection_closed(format!("{} writer has stopped", self.connection))
        })?;
        Ok(())
    }

    /// Outbound queue with no socket behind it; the receiver sees the encoded frames
    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn detached(codec: FrameCodec) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (frames, rx) = mpsc::unbounded_channel();
        // Sender dropped here; borrow() keeps returning the last value
        let (_, closed) = watch::channel(false);
        let outbound = Self {
            connection: ConnectionId::next(),
            codec,
            frames,
            closed,
        };
        (outbound, rx)
    }
}

/// Shared view of one open connection
pub(crate) struct LinkHandle {
    pub(crate) id: ConnectionId,
    pub(crate) peer: String,
    outbound: Outbound,
    closed: watch::Sender<bool>,
    shutdown: ShutdownHandle,
    stats: Arc<ConnectionStats>,
}

impl LinkHandle {
    /// Split `link`, start its writer task and hand back the reader for the role's receive loop
    pub(crate) fn open<R, W>(link: Link<R, W>, tasks: &TaskSet) -> (Arc<LinkHandle>, FrameReader<R>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Link {
            reader,
            writer,
            peer,
            shutdown,
        } = link;
        let id = ConnectionId::next();
        let (frames, rx) = mpsc::unbounded_channel();
        let (closed, closed_rx) = watch::channel(false);
        let stats = reader.stats().clone();

        let handle = Arc::new(LinkHandle {
            id,
            peer,
            outbound: Outbound {
                connection: id,
                codec: *writer.codec(),
                frames,
                closed: closed_rx,
            },
            closed,
            shutdown,
            stats,
        });

        tasks.spawn(run_writer(handle.clone(), writer, rx));
        (handle, reader)
    }

    pub(crate) fn send(&self, command: &Command) -> Result<()> {
        self.outbound.send(command)
    }

    pub(crate) fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Close both directions; only the first call has any effect
    pub(crate) fn close(&self) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }
        self.shutdown.shutdown();
        debug!(connection = %self.id, peer = %self.peer, "Link closing");
        true
    }

    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub(crate) fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }
}

/// Resolve once the closed flag is set, or its sender is gone
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn run_writer<W>(
    link: Arc<LinkHandle>,
    mut writer: FrameWriter<W>,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
) where
    W: AsyncWrite + Unpin,
{
    let mut closed = link.closed_signal();
    loop {
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(
                            connection = %link.id,
                            peer = %link.peer,
                            error = %e,
                            error_category = e.category(),
                            "Write failed, closing link"
                        );
                        link.close();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    if let Err(e) = writer.close().await {
        debug!(connection = %link.id, error = %e, "Error shutting down write half");
    }
}

/// Wait for the next command on `link`
///
/// Returns `None` once the link is closed locally, the peer closes at a frame
/// boundary (or sends `Null`), or the stream fails. All of these end the
/// receive loop.
pub(crate) async fn next_command<R>(
    link: &LinkHandle,
    reader: &mut FrameReader<R>,
    closed: &mut watch::Receiver<bool>,
) -> Option<Command>
where
    R: AsyncRead + Unpin,
{
    let result = tokio::select! {
        biased;
        _ = wait_closed(closed) => return None,
        result = reader.read_command() => result,
    };
    match result {
        Ok(Command::Null) => {
            info!(connection = %link.id, peer = %link.peer, "Peer closed connection");
            None
        }
        Ok(command) => Some(command),
        Err(e) if e.is_closed() => {
            info!(connection = %link.id, peer = %link.peer, reason = %e, "Connection lost");
            None
        }
        Err(e) => {
            warn!(
                connection = %link.id,
                peer = %link.peer,
                error = %e,
                error_category = e.category(),
                "Receive failed, closing link"
            );
            None
        }
    }
}

/// Open links of one role, ordered by connection id
#[derive(Default)]
pub(crate) struct LinkTable {
    links: Mutex<BTreeMap<ConnectionId, Arc<LinkHandle>>>,
}

impl LinkTable {
    pub(crate) fn insert(&self, link: Arc<LinkHandle>) {
        self.links.lock().insert(link.id, link);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Arc<LinkHandle>> {
        self.links.lock().remove(&id)
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<Arc<LinkHandle>> {
        self.links.lock().get(&id).cloned()
    }

    /// Links that have not started closing
    pub(crate) fn open_links(&self) -> Vec<Arc<LinkHandle>> {
        self.links
            .lock()
            .values()
            .filter(|link| !link.is_closed())
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.lock().len()
    }

    /// Close every link; returns how many were still open
    pub(crate) fn close_all(&self) -> usize {
        let links: Vec<_> = self.links.lock().values().cloned().collect();
        links.iter().filter(|link| link.close()).count()
    }
}

/// Background tasks owned by a role, joined on shutdown
#[derive(Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub(crate) fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Wait for every task spawned so far
    pub(crate) async fn join_all(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Link task panicked");
                }
            }
        }
    }
}
