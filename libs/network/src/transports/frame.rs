//! Frame Reader and Writer
//!
//! Stream-side counterpart of [`codec::FrameCodec`]. The reader pulls one field
//! at a time off an [`AsyncRead`], checking every declared length against the
//! configured limits before allocating for it. The writer loops over partial
//! writes so a frame is either fully handed to the socket or the connection is
//! reported dead.

use super::ConnectionStats;
use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use codec::{Command, CommandTag, FrameCodec, FrameLimits, LengthPrefix};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Largest single step the read buffer grows by
pub const READ_CHUNK: usize = 64 * 1024;

/// Reads commands off a byte stream
pub struct FrameReader<R> {
    inner: R,
    limits: FrameLimits,
    stats: Arc<ConnectionStats>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, limits: FrameLimits) -> Self {
        Self::with_stats(inner, limits, Arc::new(ConnectionStats::new()))
    }

    pub fn with_stats(inner: R, limits: FrameLimits, stats: Arc<ConnectionStats>) -> Self {
        Self {
            inner,
            limits,
            stats,
        }
    }

    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Read exactly `n` bytes; EOF before `n` bytes is [`TransportError::ConnectionClosed`]
    ///
    /// The buffer grows with the bytes that actually arrive, never by more
    /// than [`READ_CHUNK`] ahead of them.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK));
        while buf.len() < n {
            let want = n - buf.len();
            buf.reserve(want.min(READ_CHUNK));
            let read = (&mut self.inner)
                .take(want.min(READ_CHUNK) as u64)
                .read_buf(&mut buf)
                .await
                .map_err(|e| TransportError::io(format!("Failed to read {} bytes", n), e))?;
            if read == 0 {
                self.stats.record_received(buf.len());
                return Err(TransportError::connection_closed(format!(
                    "Failed to read {} bytes: early eof after {}",
                    n,
                    buf.len()
                )));
            }
        }
        self.stats.record_received(n);
        Ok(buf.freeze())
    }

    /// Read a one-byte length followed by that many bytes
    ///
    /// `max` is the largest length accepted. A larger declared length is
    /// rejected before any body byte is consumed; the caller must then close
    /// the connection since the stream position is lost.
    pub async fn read_length_prefixed(&mut self, max: usize) -> Result<Bytes> {
        self.read_prefixed(LengthPrefix::U8, "field", max).await
    }

    /// Read a big-endian `u32` length followed by that many bytes
    pub async fn read_u32_prefixed(&mut self, max: usize) -> Result<Bytes> {
        self.read_prefixed(LengthPrefix::U32, "payload", max).await
    }

    async fn read_prefixed(
        &mut self,
        prefix: LengthPrefix,
        field: &'static str,
        max: usize,
    ) -> Result<Bytes> {
        let header = self.read_exact(prefix.width()).await?;
        let len = match prefix {
            LengthPrefix::U8 => header[0] as usize,
            LengthPrefix::U32 => {
                u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
            }
        };
        if len > max {
            debug!(field, len, max, "Rejected oversized length prefix");
            return Err(TransportError::oversize(field, len, max));
        }
        self.read_exact(len).await
    }

    /// Read one complete command
    ///
    /// A clean EOF exactly at a frame boundary yields [`Command::Null`], the
    /// same value a peer's explicit terminator decodes to. EOF anywhere inside
    /// a frame is [`TransportError::ConnectionClosed`].
    pub async fn read_command(&mut self) -> Result<Command> {
        let mut tag = [0u8; 1];
        let n = self
            .inner
            .read(&mut tag)
            .await
            .map_err(|e| TransportError::io("Failed to read command tag", e))?;
        if n == 0 {
            trace!("End of stream at frame boundary");
            return Ok(Command::Null);
        }
        self.stats.record_received(1);

        let tag = CommandTag::from_byte(tag[0])?;
        let layout = tag.layout();
        let mut fields = Vec::with_capacity(layout.len());
        for field in layout {
            let max = self.limits.max_len(*field);
            fields.push(self.read_prefixed(field.prefix(), field.name(), max).await?);
        }

        self.stats.record_frame_received();
        Ok(Command::from_fields(tag, fields)?)
    }
}

/// Writes commands to a byte stream
pub struct FrameWriter<W> {
    inner: W,
    codec: FrameCodec,
    buf: BytesMut,
    stats: Arc<ConnectionStats>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, limits: FrameLimits) -> Self {
        Self::with_stats(inner, limits, Arc::new(ConnectionStats::new()))
    }

    pub fn with_stats(inner: W, limits: FrameLimits, stats: Arc<ConnectionStats>) -> Self {
        Self {
            inner,
            codec: FrameCodec::new(limits),
            buf: BytesMut::with_capacity(4 * 1024),
            stats,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Write all of `bytes`, looping over partial writes
    ///
    /// A write that accepts zero bytes means the peer is gone and is reported
    /// as [`TransportError::ConnectionClosed`].
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.inner.write(&bytes[written..]).await {
                Ok(0) => {
                    return Err(TransportError::connection_closed(format!(
                        "write accepted 0 bytes after {} of {}",
                        written,
                        bytes.len()
                    )))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::io("Failed to write frame", e)),
            }
        }
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::io("Failed to flush stream", e))?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }

    /// Encode and write one command
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let result = match self.codec.encode_into(command, &mut buf) {
            Ok(()) => self.write_all(&buf).await,
            Err(e) => Err(e.into()),
        };
        self.buf = buf;
        result?;

        self.stats.record_frame_sent();
        trace!(command = %command.tag(), "Sent command");
        Ok(())
    }

    /// Shut down the write half; the peer's reader sees a clean EOF
    pub async fn close(&mut self) -> Result<()> {
        match self.inner.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::io("Failed to shut down stream", e)),
        }
    }
}
