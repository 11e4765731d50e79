/// Errors that can occur during line encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The line exceeds the configured maximum length.
    #[error("line too large ({size} bytes, max {max})")]
    LineTooLarge { size: usize, max: usize },

    /// An outbound payload contains a raw newline and cannot be framed.
    #[error("payload contains an embedded newline")]
    EmbeddedNewline,

    /// A message could not be serialized.
    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing lines.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
