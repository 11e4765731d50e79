use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::{encode_line, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Writes newline-delimited messages to an async byte stream.
///
/// Each line goes out as a single `write_all` followed by a flush, so a
/// line is never interleaved with another as long as one writer owns the
/// stream.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    max_line_length: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new writer with custom configuration.
    pub fn with_config(inner: W, config: &FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            max_line_length: config.max_line_length,
        }
    }

    /// Encode and write one message.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode()?;
        self.send_line(&payload).await
    }

    /// Write one already-encoded payload, appending the terminator.
    pub async fn send_line(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_line_length {
            return Err(FrameError::LineTooLarge {
                size: payload.len(),
                max: self.max_line_length,
            });
        }

        self.buf.clear();
        encode_line(payload, &mut self.buf)?;
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write half, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
