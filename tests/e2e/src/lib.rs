//! End-to-End Test Framework for the remote actor protocol
//!
//! Starts real master and slave runtimes on loopback TCP. Slaves listen on an
//! ephemeral port; masters dial them (or the reverse).

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use remote_actors::{
    ActorTypeRegistry, ChannelReplyHandler, LocalRuntime, MailboxRuntime, MasterEvent, RemoteActor,
    RemoteConfig, RemoteRuntime, ReplySink, VersionToken,
};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use remote_actors::testing::{eventually, within, RecordingRuntime, RuntimeEvent};

static LOGGING: Once = Once::new();

/// Log to the test writer; `RUST_LOG` selects the level
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "remote_actors=debug,warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn config(token: &str) -> RemoteConfig {
    RemoteConfig::default().with_token(VersionToken::new(token))
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Slave runtime listening on loopback
pub struct SlaveNode<RT: LocalRuntime> {
    pub runtime: Arc<RT>,
    pub remote: RemoteRuntime<RT>,
    pub addr: SocketAddr,
}

impl<RT: LocalRuntime> SlaveNode<RT> {
    pub async fn start(config: RemoteConfig, runtime: Arc<RT>) -> Result<Self> {
        init_test_logging();
        let remote = RemoteRuntime::new(config).with_slave(runtime.clone());
        let slave = remote.slave().context("slave role missing")?;
        let addr = slave.listen(loopback()).await.context("slave listen")?;
        info!(%addr, "Test slave listening");
        Ok(Self { runtime, remote, addr })
    }

    pub fn link_count(&self) -> usize {
        self.remote.slave().map_or(0, |slave| slave.link_count())
    }

    pub fn actor_count(&self) -> usize {
        self.remote.slave().map_or(0, |slave| slave.actor_count())
    }
}

/// Master runtime with its reply events
pub struct MasterNode {
    pub remote: RemoteRuntime,
    pub events: mpsc::UnboundedReceiver<MasterEvent>,
}

impl MasterNode {
    pub fn new(config: RemoteConfig) -> Self {
        init_test_logging();
        let (handler, events) = ChannelReplyHandler::new();
        let remote = RemoteRuntime::new(config).with_master(Arc::new(handler));
        Self { remote, events }
    }

    /// Master that has dialed every slave in `slaves`
    pub async fn connect(config: RemoteConfig, slaves: &[SocketAddr]) -> Result<Self> {
        let node = Self::new(config);
        let master = node.remote.master().context("master role missing")?;
        for &addr in slaves {
            let connection = master.connect(addr).await.with_context(|| format!("dial {}", addr))?;
            debug!(%connection, %addr, "Test master linked");
        }
        Ok(node)
    }

    /// Start accepting slaves on loopback
    pub async fn listen(&self) -> Result<SocketAddr> {
        let master = self.remote.master().context("master role missing")?;
        Ok(master.listen(loopback()).await?)
    }

    pub fn link_count(&self) -> usize {
        self.remote.master().map_or(0, |master| master.link_count())
    }

    pub fn remote_actor_count(&self) -> usize {
        self.remote.master().map_or(0, |master| master.remote_actor_count())
    }

    pub async fn next_event(&mut self) -> Option<MasterEvent> {
        within(self.events.recv()).await
    }
}

/// Replies with its input
pub struct Echo;

#[async_trait]
impl RemoteActor for Echo {
    async fn receive(&mut self, _behavior: &str, payload: Bytes, replies: &ReplySink) {
        let _ = replies.reply(payload);
    }
}

/// Adds one byte per `increment`, replies with the total on `get`
#[derive(Default)]
pub struct Counter {
    total: u64,
}

#[async_trait]
impl RemoteActor for Counter {
    async fn receive(&mut self, behavior: &str, payload: Bytes, replies: &ReplySink) {
        match behavior {
            "increment" => self.total += payload.iter().map(|b| u64::from(*b)).sum::<u64>(),
            "get" => {
                let _ = replies.reply(Bytes::copy_from_slice(&self.total.to_be_bytes()));
            }
            _ => {}
        }
    }
}

/// Mailbox runtime hosting `Echo` and `Counter`
pub fn mailbox_runtime() -> Arc<MailboxRuntime> {
    let types = Arc::new(ActorTypeRegistry::new());
    types.register("Echo", || Echo);
    types.register("Counter", Counter::default);
    Arc::new(MailboxRuntime::new(types))
}
