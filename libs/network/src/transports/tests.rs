//! Transport Layer Tests
//!
//! Framing over in-memory streams plus real loopback TCP links.

use super::*;
use crate::TransportError;
use bytes::Bytes;
use codec::{Command, FrameCodec};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWriteExt;

fn send_message() -> Command {
    Command::SendMessage {
        actor_uuid: "uuid-1".into(),
        behavior_name: "increment".into(),
        payload: Bytes::from_static(&[0x01]),
    }
}

/// Accepts at most one byte per write call
#[derive(Default)]
struct TrickleWriter {
    out: Vec<u8>,
}

impl AsyncWrite for TrickleWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match buf.first() {
            Some(byte) => {
                this.out.push(*byte);
                Poll::Ready(Ok(1))
            }
            None => Poll::Ready(Ok(0)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Never accepts a byte
struct ClosedWriter;

impl AsyncWrite for ClosedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

mod framing {
    use super::*;

    #[tokio::test]
    async fn test_partial_writes_produce_identical_bytes() {
        let expected = FrameCodec::default().encode(&send_message()).unwrap();

        let mut writer = FrameWriter::new(TrickleWriter::default(), FrameLimits::default());
        writer.send(&send_message()).await.unwrap();

        assert_eq!(writer.get_ref().out, expected.to_vec());
        let stats = writer.stats().snapshot();
        assert_eq!(stats.bytes_sent, expected.len() as u64);
        assert_eq!(stats.frames_sent, 1);
    }

    #[tokio::test]
    async fn test_zero_byte_write_is_connection_closed() {
        let mut writer = FrameWriter::new(ClosedWriter, FrameLimits::default());
        let err = writer.write_all(b"abc").await.unwrap_err();
        assert!(err.is_closed(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_writer_refuses_oversized_command() {
        let mut writer = FrameWriter::new(TrickleWriter::default(), FrameLimits::new(4, 16));
        let err = writer
            .send(&Command::DestroyActor {
                actor_uuid: "too-long".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(writer.get_ref().out.is_empty());
    }

    #[tokio::test]
    async fn test_read_command_over_chunked_duplex() {
        // An 8 byte pipe forces the frame through in several pieces
        let (client, server) = tokio::io::duplex(8);
        let (_client_read, client_write) = tokio::io::split(client);
        let (server_read, _server_write) = tokio::io::split(server);

        let mut writer = FrameWriter::new(client_write, FrameLimits::default());
        let mut reader = FrameReader::new(server_read, FrameLimits::default());

        let sent = vec![
            Command::VersionCheck { token: "v1".into() },
            Command::CreateActor {
                actor_uuid: "uuid-1".into(),
                type_name: "Counter".into(),
            },
            send_message(),
        ];
        let to_send = sent.clone();
        let write_task = tokio::spawn(async move {
            for cmd in &to_send {
                writer.send(cmd).await.unwrap();
            }
            writer.close().await.unwrap();
        });

        let mut received = Vec::new();
        loop {
            match reader.read_command().await.unwrap() {
                Command::Null => break,
                cmd => received.push(cmd),
            }
        }
        write_task.await.unwrap();

        assert_eq!(received, sent);
        assert_eq!(reader.stats().snapshot().frames_received, 3);
    }

    #[tokio::test]
    async fn test_explicit_null_ends_stream() {
        let bytes = [0x00u8, 0x03, 1, b'x'];
        let mut reader = FrameReader::new(&bytes[..], FrameLimits::default());
        assert_eq!(reader.read_command().await.unwrap(), Command::Null);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        let frame = FrameCodec::default().encode(&send_message()).unwrap();
        let truncated = &frame[..frame.len() - 1];
        let mut reader = FrameReader::new(truncated, FrameLimits::default());
        let err = reader.read_command().await.unwrap_err();
        assert!(err.is_closed(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_protocol_error() {
        let bytes = [0x42u8];
        let mut reader = FrameReader::new(&bytes[..], FrameLimits::default());
        let err = reader.read_command().await.unwrap_err();
        assert_eq!(err.category(), "unknown_command");
    }
}

mod limits {
    use super::*;

    #[tokio::test]
    async fn test_length_prefixed_at_and_above_maximum() {
        let mut at_max = vec![16u8];
        at_max.extend_from_slice(&[b'a'; 16]);
        let mut reader = FrameReader::new(&at_max[..], FrameLimits::default());
        assert_eq!(reader.read_length_prefixed(16).await.unwrap().len(), 16);

        let mut above = vec![17u8];
        above.extend_from_slice(&[b'a'; 17]);
        let mut reader = FrameReader::new(&above[..], FrameLimits::default());
        let err = reader.read_length_prefixed(16).await.unwrap_err();
        assert!(matches!(err, TransportError::Oversize { len: 17, max: 16, .. }));
        // Only the length byte was consumed
        assert_eq!(reader.stats().snapshot().bytes_received, 1);
    }

    #[tokio::test]
    async fn test_u32_prefixed_rejects_before_allocating() {
        // Declares 4 GiB but carries nothing; must fail on the length alone
        let bytes = u32::MAX.to_be_bytes();
        let mut reader = FrameReader::new(&bytes[..], FrameLimits::default());
        let err = reader.read_u32_prefixed(1024).await.unwrap_err();
        assert!(matches!(err, TransportError::Oversize { field: "payload", .. }));
    }

    #[tokio::test]
    async fn test_allowed_length_without_body_is_connection_closed() {
        let bytes = (1u32 << 30).to_be_bytes();
        let mut reader = FrameReader::new(&bytes[..], FrameLimits::default());
        let err = reader.read_u32_prefixed(u32::MAX as usize).await.unwrap_err();
        assert!(err.is_closed(), "unexpected error: {:?}", err);
        assert_eq!(reader.stats().snapshot().bytes_received, 4);
    }

    #[tokio::test]
    async fn test_body_larger_than_read_chunk_arrives_whole() {
        let len = READ_CHUNK * 3 + 17;
        let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let (client, mut server) = tokio::io::duplex(4096);
        let writer = tokio::spawn({
            let body = body.clone();
            async move {
                server.write_all(&(len as u32).to_be_bytes()).await.unwrap();
                server.write_all(&body).await.unwrap();
            }
        });

        let mut reader = FrameReader::new(client, FrameLimits::default());
        let read = reader.read_u32_prefixed(len).await.unwrap();
        writer.await.unwrap();
        assert_eq!(read.len(), len);
        assert_eq!(&read[..], &body[..]);
    }

    #[tokio::test]
    async fn test_read_command_applies_configured_limits() {
        let frame = FrameCodec::default()
            .encode(&Command::DestroyActor {
                actor_uuid: "x".repeat(9),
            })
            .unwrap();
        let mut reader = FrameReader::new(&frame[..], FrameLimits::new(8, 1024));
        let err = reader.read_command().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Oversize {
                field: "actor_uuid",
                len: 9,
                max: 8
            }
        ));
    }
}

mod tcp_links {
    use super::*;

    #[tokio::test]
    async fn test_dial_accept_exchange() {
        let config = TcpLinkConfig::default();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_config = config.clone();
        let server = tokio::spawn(async move {
            let mut link = accept(&listener, &server_config).await.unwrap();
            let cmd = link.reader.read_command().await.unwrap();
            link.writer
                .send(&Command::SendReply {
                    actor_uuid: "uuid-1".into(),
                    payload: Bytes::from_static(b"pong"),
                })
                .await
                .unwrap();
            cmd
        });

        let mut link = dial(addr, &config).await.unwrap();
        link.writer.send(&send_message()).await.unwrap();
        let reply = link.reader.read_command().await.unwrap();

        assert_eq!(server.await.unwrap(), send_message());
        assert_eq!(
            reply,
            Command::SendReply {
                actor_uuid: "uuid-1".into(),
                payload: Bytes::from_static(b"pong"),
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_wakes_both_ends() {
        let config = TcpLinkConfig::default();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_config = config.clone();
        let server = tokio::spawn(async move {
            let mut link = accept(&listener, &server_config).await.unwrap();
            link.reader.read_command().await.unwrap()
        });

        let Link {
            mut reader,
            shutdown,
            ..
        } = dial(addr, &config).await.unwrap();
        let local_reader = tokio::spawn(async move { reader.read_command().await.unwrap() });

        assert!(shutdown.shutdown());
        assert!(!shutdown.shutdown());
        assert!(shutdown.is_shut_down());

        // Both the remote reader and our own blocked reader see a clean EOF
        assert_eq!(server.await.unwrap(), Command::Null);
        assert_eq!(local_reader.await.unwrap(), Command::Null);
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = dial(addr, &TcpLinkConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_detached_handle_is_noop() {
        let handle = ShutdownHandle::detached();
        assert!(!handle.shutdown());
        let (a, _b) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(a);
        let link = Link::new(r, w, "duplex", FrameLimits::default());
        assert_eq!(link.peer, "duplex");
        assert!(!link.shutdown.shutdown());
    }
}
