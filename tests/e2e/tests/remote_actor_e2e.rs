//! Master and slave over real loopback sockets

use bytes::Bytes;
use codec::FrameLimits;
use network::TcpLinkConfig;
use remote_actors::{MasterEvent, RemoteError};
use remote_e2e_tests::{
    config, eventually, mailbox_runtime, within, MasterNode, RecordingRuntime, RuntimeEvent,
    SlaveNode,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn recording() -> Arc<RecordingRuntime> {
    Arc::new(RecordingRuntime::new(["Counter", "Echo"]))
}

#[tokio::test]
async fn test_actor_lifecycle_over_tcp() {
    let slave = SlaveNode::start(config("v1"), recording()).await.unwrap();
    let master = MasterNode::connect(config("v1"), &[slave.addr]).await.unwrap();

    let uuid = master.remote.remote_create_actor(Some("uuid-1"), "Counter").unwrap();
    assert_eq!(uuid.as_str(), "uuid-1");
    assert!(master.remote.remote_send("uuid-1", "increment", vec![0x01]).unwrap());
    assert!(master.remote.remote_destroy_actor("uuid-1").unwrap());

    let events = slave.runtime.wait_for_events(3).await;
    assert_eq!(
        events,
        vec![
            RuntimeEvent::Created {
                uuid: "uuid-1".into(),
                type_name: "Counter".into(),
            },
            RuntimeEvent::Dispatched {
                uuid: "uuid-1".into(),
                behavior: "increment".into(),
                payload: Bytes::from_static(&[0x01]),
            },
            RuntimeEvent::Destroyed { uuid: "uuid-1".into() },
        ]
    );
    assert_eq!(slave.actor_count(), 0);
    assert_eq!(master.remote_actor_count(), 0);
    assert_eq!(slave.runtime.live_count(), 0);

    master.remote.shutdown().await;
    slave.remote.shutdown().await;
}

#[tokio::test]
async fn test_version_mismatch_closes_link() {
    let slave = SlaveNode::start(config("v2"), recording()).await.unwrap();
    let mut master = MasterNode::connect(config("v1"), &[slave.addr]).await.unwrap();

    let uuid = master.remote.remote_create_actor(None, "Counter").unwrap();

    match master.next_event().await {
        Some(MasterEvent::LinkLost { orphaned, .. }) => assert_eq!(orphaned, vec![uuid]),
        other => panic!("expected link loss, got {:?}", other),
    }
    assert!(eventually(|| slave.link_count() == 0).await);
    assert_eq!(master.link_count(), 0);
    assert!(slave.runtime.events().is_empty());
    assert!(matches!(
        master.remote.remote_create_actor(None, "Counter"),
        Err(RemoteError::NoSlaveAvailable)
    ));
}

#[tokio::test]
async fn test_reply_round_trip() {
    let slave = SlaveNode::start(config("v1"), mailbox_runtime()).await.unwrap();
    let mut master = MasterNode::connect(config("v1"), &[slave.addr]).await.unwrap();

    let echo = master.remote.remote_create_actor(None, "Echo").unwrap();
    master.remote.remote_send(echo.as_str(), "ping", &b"hello"[..]).unwrap();

    assert_eq!(
        master.next_event().await,
        Some(MasterEvent::Reply {
            actor_uuid: echo.to_string(),
            payload: Bytes::from_static(b"hello"),
        })
    );

    let counter = master.remote.remote_create_actor(Some("counter-1"), "Counter").unwrap();
    for _ in 0..3 {
        master.remote.remote_send(counter.as_str(), "increment", vec![0x01]).unwrap();
    }
    master.remote.remote_send(counter.as_str(), "get", Bytes::new()).unwrap();
    assert_eq!(
        master.next_event().await,
        Some(MasterEvent::Reply {
            actor_uuid: "counter-1".into(),
            payload: Bytes::copy_from_slice(&3u64.to_be_bytes()),
        })
    );

    master.remote.shutdown().await;
    slave.remote.shutdown().await;
}

#[tokio::test]
async fn test_slave_dials_master() {
    let master = MasterNode::new(config("v1"));
    let addr = master.listen().await.unwrap();

    let slave_runtime = recording();
    let slave = remote_actors::RemoteRuntime::new(config("v1")).with_slave(slave_runtime.clone());
    slave.slave().unwrap().connect(addr).await.unwrap();

    assert!(eventually(|| master.link_count() == 1).await);
    master.remote.remote_create_actor(Some("uuid-1"), "Echo").unwrap();
    let events = slave_runtime.wait_for_events(1).await;
    assert_eq!(
        events,
        vec![RuntimeEvent::Created {
            uuid: "uuid-1".into(),
            type_name: "Echo".into(),
        }]
    );

    slave.shutdown().await;
    master.remote.shutdown().await;
}

#[tokio::test]
async fn test_placement_spreads_across_slaves() {
    let first = SlaveNode::start(config("v1"), recording()).await.unwrap();
    let second = SlaveNode::start(config("v1"), recording()).await.unwrap();
    let master = MasterNode::connect(config("v1"), &[first.addr, second.addr]).await.unwrap();

    for _ in 0..4 {
        master.remote.remote_create_actor(None, "Counter").unwrap();
    }

    assert!(eventually(|| first.actor_count() == 2 && second.actor_count() == 2).await);
    let links = master.remote.master().unwrap().links();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|link| link.remote_actors == 2));
}

#[tokio::test]
async fn test_shutdown_twice_leaves_nothing_behind() {
    let slave = SlaveNode::start(config("v1"), mailbox_runtime()).await.unwrap();
    let mut master = MasterNode::connect(config("v1"), &[slave.addr]).await.unwrap();

    master.remote.remote_create_actor(Some("a"), "Counter").unwrap();
    master.remote.remote_create_actor(Some("b"), "Echo").unwrap();
    assert!(eventually(|| slave.actor_count() == 2).await);

    within(slave.remote.shutdown()).await;
    within(slave.remote.shutdown()).await;
    assert_eq!(slave.link_count(), 0);
    assert_eq!(slave.actor_count(), 0);
    assert!(eventually(|| slave.runtime.live_actor_count() == 0).await);

    match master.next_event().await {
        Some(MasterEvent::LinkLost { orphaned, .. }) => assert_eq!(orphaned.len(), 2),
        other => panic!("expected link loss, got {:?}", other),
    }

    within(master.remote.shutdown()).await;
    within(master.remote.shutdown()).await;
    assert_eq!(master.link_count(), 0);
    assert_eq!(master.remote_actor_count(), 0);
    assert!(matches!(
        master.remote.remote_send("a", "increment", vec![1]),
        Err(RemoteError::ShutDown)
    ));
}

#[tokio::test]
async fn test_oversized_payload_closes_link_before_dispatch() {
    let link = TcpLinkConfig {
        limits: FrameLimits::new(255, 1024),
        ..TcpLinkConfig::default()
    };
    let slave = SlaveNode::start(config("v1").with_link(link), recording()).await.unwrap();

    let mut raw = TcpStream::connect(slave.addr).await.unwrap();
    let mut frames = Vec::new();
    frames.extend_from_slice(&[0x01, 2, b'v', b'1']);
    frames.extend_from_slice(&[0x02, 1, b'a', 7, b'C', b'o', b'u', b'n', b't', b'e', b'r']);
    // SendMessage declaring a payload one byte over the limit, body never sent
    frames.extend_from_slice(&[0x04, 1, b'a', 1, b'b']);
    frames.extend_from_slice(&1025u32.to_be_bytes());
    raw.write_all(&frames).await.unwrap();

    let mut buf = [0u8; 16];
    let read = within(raw.read(&mut buf)).await;
    assert!(matches!(read, Ok(0) | Err(_)));

    let events = slave.runtime.wait_for_events(2).await;
    assert_eq!(
        events,
        vec![
            RuntimeEvent::Created {
                uuid: "a".into(),
                type_name: "Counter".into(),
            },
            RuntimeEvent::Destroyed { uuid: "a".into() },
        ]
    );
    assert!(eventually(|| slave.link_count() == 0).await);
}

#[tokio::test]
async fn test_payload_at_limit_is_delivered() {
    let link = TcpLinkConfig {
        limits: FrameLimits::new(255, 1024),
        ..TcpLinkConfig::default()
    };
    let slave = SlaveNode::start(config("v1").with_link(link.clone()), recording()).await.unwrap();
    let master = MasterNode::connect(config("v1").with_link(link), &[slave.addr]).await.unwrap();

    master.remote.remote_create_actor(Some("a"), "Echo").unwrap();
    assert!(master.remote.remote_send("a", "big", vec![7u8; 1024]).unwrap());
    // Refused locally, never reaches the socket
    assert!(master.remote.remote_send("a", "big", vec![7u8; 1025]).is_err());

    let events = slave.runtime.wait_for_events(2).await;
    assert!(matches!(
        &events[1],
        RuntimeEvent::Dispatched { payload, .. } if payload.len() == 1024
    ));
    assert_eq!(master.link_count(), 1);
}
