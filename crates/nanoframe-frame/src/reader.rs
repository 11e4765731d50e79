use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::{FrameConfig, MessageCodec};
use crate::error::Result;
use crate::message::Message;

/// Reads classified messages from an async byte stream.
///
/// Blank, malformed, and oversized lines are skipped. Only I/O failures
/// surface as errors.
pub struct FrameReader<R> {
    inner: FramedRead<R, MessageCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new reader with custom configuration.
    pub fn with_config(inner: R, config: &FrameConfig) -> Self {
        Self {
            inner: FramedRead::new(inner, MessageCodec::with_config(config)),
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        self.inner.next().await.transpose()
    }

    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}
