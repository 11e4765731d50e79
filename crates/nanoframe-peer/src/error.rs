use std::time::Duration;

/// Errors that can occur in connection and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (resolving, spawning, or signalling the engine).
    #[error("transport error: {0}")]
    Transport(#[from] nanoframe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] nanoframe_frame::FrameError),

    /// The engine answered with an error object.
    #[error("engine error: {message}")]
    Rpc {
        code: Option<i64>,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The liveness handshake did not succeed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection closed before a response arrived.
    #[error("connection closed: {0}")]
    Closed(String),

    /// A request could not be put on the wire.
    #[error("request encoding failed: {0}")]
    Encode(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeerError {
    /// True for the errors that mean the engine is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, PeerError::Closed(_))
    }
}

impl From<nanoframe_frame::RpcError> for PeerError {
    fn from(err: nanoframe_frame::RpcError) -> Self {
        PeerError::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
