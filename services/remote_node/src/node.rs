//! Node assembly: configuration to running roles

use crate::actors;
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use codec::FrameLimits;
use config::{NodeConfig, NodeRole};
use network::TcpLinkConfig;
use remote_actors::{
    ActorTypeRegistry, ActorUuid, ConnectionId, MailboxRuntime, Master, RemoteConfig,
    RemoteRuntime, ReplyHandler, VersionToken, GENERATED_UUID_LEN,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Map the file settings onto role settings
pub fn remote_config(config: &NodeConfig) -> Result<RemoteConfig> {
    let max_field_len = u8::try_from(config.limits.max_field_len)
        .context("limits.max_field_len does not fit one length byte")?;
    let max_payload_len = u32::try_from(config.limits.max_payload_len)
        .context("limits.max_payload_len exceeds u32")?;
    if usize::from(max_field_len) < GENERATED_UUID_LEN {
        bail!(
            "limits.max_field_len {} cannot carry a generated actor uuid ({} bytes)",
            max_field_len,
            GENERATED_UUID_LEN
        );
    }

    let version_token = match &config.node.version_token {
        Some(token) => VersionToken::new(token.clone()),
        None => VersionToken::build(),
    };
    if version_token.as_str().len() > usize::from(max_field_len) {
        bail!(
            "version token {:?} is longer than limits.max_field_len {}",
            version_token.as_str(),
            max_field_len
        );
    }
    let link = TcpLinkConfig {
        connect_timeout: config.connect_timeout(),
        nodelay: config.network.nodelay,
        limits: FrameLimits::new(max_field_len, max_payload_len),
    };
    Ok(RemoteConfig::default().with_token(version_token).with_link(link))
}

/// Logs replies and lost links
pub struct LoggingReplies;

impl ReplyHandler for LoggingReplies {
    fn on_reply(&self, actor_uuid: &str, payload: Bytes) {
        info!(actor = actor_uuid, bytes = payload.len(), payload = ?payload, "Reply");
    }

    fn on_link_lost(&self, connection: ConnectionId, orphaned: &[ActorUuid]) {
        warn!(%connection, orphaned = orphaned.len(), "Slave link lost");
    }
}

/// Build the runtime for the configured role and bring its links up
pub async fn start(config: &NodeConfig) -> Result<RemoteRuntime> {
    let remote = remote_config(config)?;
    info!(
        role = %config.node.role,
        name = %config.node.name,
        version_token = %remote.version_token,
        "Starting node"
    );

    let runtime = match config.node.role {
        NodeRole::Master => RemoteRuntime::new(remote).with_master(Arc::new(LoggingReplies)),
        NodeRole::Slave => {
            let types = Arc::new(ActorTypeRegistry::new());
            actors::register_builtin_types(&types);
            info!(types = ?types.type_names(), "Actor types registered");
            RemoteRuntime::new(remote).with_slave(Arc::new(MailboxRuntime::new(types)))
        }
    };

    let mut listening = false;
    if let Some(addr) = config.network.listen {
        let bound = match (runtime.master(), runtime.slave()) {
            (Some(master), _) => master.listen(addr).await,
            (_, Some(slave)) => slave.listen(addr).await,
            (None, None) => bail!("no role configured"),
        }
        .with_context(|| format!("Failed to listen on {}", addr))?;
        info!(%bound, "Listening");
        listening = true;
    }

    let mut connected = 0;
    for &addr in &config.network.connect {
        let result = match (runtime.master(), runtime.slave()) {
            (Some(master), _) => master.connect(addr).await,
            (_, Some(slave)) => slave.connect(addr).await,
            (None, None) => bail!("no role configured"),
        };
        match result {
            Ok(connection) => {
                info!(%connection, peer = %addr, "Connected");
                connected += 1;
            }
            Err(e) => warn!(
                peer = %addr,
                error = %e,
                error_category = e.category(),
                "Connect failed"
            ),
        }
    }

    if !listening && connected == 0 {
        runtime.shutdown().await;
        bail!("no link established and nothing to listen on");
    }
    Ok(runtime)
}

/// Exercise a slave once one is linked: create a counter, bump it, read it back
pub async fn run_demo(master: Master) -> Result<()> {
    let mut waited = Duration::ZERO;
    while master.link_count() == 0 {
        if waited >= Duration::from_secs(30) {
            bail!("no slave linked within 30s");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    let uuid = master.remote_create_actor(None, actors::COUNTER)?;
    info!(actor = %uuid, "Demo counter created");
    for _ in 0..3 {
        master.remote_send(uuid.as_str(), "increment", Bytes::from_static(&[0x01]))?;
    }
    master.remote_send(uuid.as_str(), "get", Bytes::new())?;

    // Give the reply time to arrive before the actor goes away
    tokio::time::sleep(Duration::from_millis(500)).await;
    master.remote_destroy_actor(uuid.as_str())?;
    info!(actor = %uuid, "Demo counter destroyed");
    Ok(())
}
