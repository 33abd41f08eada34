//! Remote Runtime
//!
//! Process-wide owner of the master and slave roles. Callers create remote
//! actors through it and tear both roles down with a single [`shutdown`]
//! call, which may be issued any number of times from any task.
//!
//! [`shutdown`]: RemoteRuntime::shutdown

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::local::{LocalRuntime, MailboxRuntime};
use crate::master::{Master, ReplyHandler};
use crate::registry::ActorUuid;
use crate::slave::Slave;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Master and/or slave role with a shared lifecycle
pub struct RemoteRuntime<RT: LocalRuntime = MailboxRuntime> {
    config: RemoteConfig,
    master: Option<Master>,
    slave: Option<Slave<RT>>,
    shutting_down: AtomicBool,
    done: watch::Sender<bool>,
}

impl<RT: LocalRuntime> RemoteRuntime<RT> {
    /// Runtime with no roles; add them with [`with_master`](Self::with_master)
    /// and [`with_slave`](Self::with_slave)
    pub fn new(config: RemoteConfig) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            config,
            master: None,
            slave: None,
            shutting_down: AtomicBool::new(false),
            done,
        }
    }

    pub fn with_master(mut self, replies: Arc<dyn ReplyHandler>) -> Self {
        self.master = Some(Master::new(self.config.clone(), replies));
        self
    }

    pub fn with_slave(mut self, runtime: Arc<RT>) -> Self {
        self.slave = Some(Slave::new(self.config.clone(), runtime));
        self
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn master(&self) -> Option<&Master> {
        self.master.as_ref()
    }

    pub fn slave(&self) -> Option<&Slave<RT>> {
        self.slave.as_ref()
    }

    fn running_master(&self) -> Result<&Master> {
        if self.is_shut_down() {
            return Err(RemoteError::ShutDown);
        }
        self.master
            .as_ref()
            .ok_or(RemoteError::RoleNotConfigured { role: "master" })
    }

    pub fn remote_create_actor(
        &self,
        uuid_hint: Option<&str>,
        type_name: &str,
    ) -> Result<ActorUuid> {
        self.running_master()?.remote_create_actor(uuid_hint, type_name)
    }

    pub fn remote_destroy_actor(&self, actor_uuid: &str) -> Result<bool> {
        self.running_master()?.remote_destroy_actor(actor_uuid)
    }

    pub fn remote_send(
        &self,
        actor_uuid: &str,
        behavior: &str,
        payload: impl Into<Bytes>,
    ) -> Result<bool> {
        self.running_master()?.remote_send(actor_uuid, behavior, payload)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Tear down both roles
    ///
    /// The first call closes every link, waits for the receive loops and
    /// destroys hosted actors. Later or concurrent calls wait for that to
    /// finish and return.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            self.wait_for_shutdown().await;
            return;
        }

        info!(
            master = self.master.is_some(),
            slave = self.slave.is_some(),
            "Shutting down remote runtime"
        );
        match (&self.master, &self.slave) {
            (Some(master), Some(slave)) => {
                tokio::join!(master.shutdown(), slave.shutdown());
            }
            (Some(master), None) => master.shutdown().await,
            (None, Some(slave)) => slave.shutdown().await,
            (None, None) => {}
        }
        self.done.send_replace(true);
        info!("Remote runtime shutdown complete");
    }

    /// Resolve once a shutdown has completed
    pub async fn wait_for_shutdown(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }
}
