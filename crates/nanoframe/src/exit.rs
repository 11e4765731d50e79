use std::fmt;
use std::io;

use nanoframe_frame::FrameError;
use nanoframe_peer::PeerError;
use nanoframe_transport::TransportError;

// Exit codes. An engine exit code passed through by `run` takes precedence.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const NOT_FOUND: i32 = 127;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => NOT_FOUND,
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Spawn { ref source, .. } => {
            let code = match source.kind() {
                io::ErrorKind::NotFound => NOT_FOUND,
                io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
                _ => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Exited => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::LineTooLarge { .. } | FrameError::EmbeddedNewline | FrameError::Encode(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::HandshakeFailed(_) => {
            CliError::new(HEALTH_CHECK_FAILED, format!("{context}: {err}"))
        }
        PeerError::Encode(_) | PeerError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::Rpc { .. } | PeerError::Closed(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_engine_maps_to_not_found() {
        let err = PeerError::Transport(TransportError::Spawn {
            program: "nanoframe-core".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        let cli = peer_error("engine launch failed", err);
        assert_eq!(cli.code, NOT_FOUND);
        assert!(cli.message.starts_with("engine launch failed: "));
    }

    #[test]
    fn timeouts_map_to_124() {
        let cli = peer_error("call failed", PeerError::Timeout(Duration::from_secs(1)));
        assert_eq!(cli.code, TIMEOUT);
    }

    #[test]
    fn engine_errors_are_plain_failures() {
        let err = PeerError::Rpc {
            code: Some(-32601),
            message: "Method not found".to_string(),
            data: None,
        };
        let cli = peer_error("call failed", err);
        assert_eq!(cli.code, FAILURE);
        assert_eq!(cli.message, "call failed: engine error: Method not found");
    }
}
