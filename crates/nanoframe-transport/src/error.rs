use std::path::PathBuf;

/// Errors that can occur while launching or supervising the engine process.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The engine executable could not be started.
    #[error("failed to spawn engine {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// A stdio pipe was not attached to the spawned child.
    #[error("engine {0} pipe was not attached")]
    MissingPipe(&'static str),

    /// Delivering a signal to the engine failed.
    #[error("failed to signal engine pid {pid} with {signal}: {source}")]
    Signal {
        pid: u32,
        signal: i32,
        source: std::io::Error,
    },

    /// The engine has already exited.
    #[error("engine process has exited")]
    Exited,

    /// An I/O error occurred on the engine's streams.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True when the spawn failed because the executable does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TransportError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
