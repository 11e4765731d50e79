//! Stdio JSON-RPC transport for driving a native windowing engine.
//!
//! nanoframe runs the rendering engine (`nanoframe-core`) as a child process
//! and talks to it with newline-delimited JSON-RPC over the child's stdin and
//! stdout. The engine's stderr passes straight through.
//!
//! # Crate Structure
//!
//! - [`transport`]: engine resolution and process supervision
//! - [`frame`]: line framing and the message model
//! - [`peer`]: connection, request correlation, notifications, engine
//!   lifecycle (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use nanoframe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nanoframe_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use nanoframe_peer::*;
}

#[cfg(feature = "peer")]
pub use nanoframe_peer::{
    launch, Connection, Engine, EngineConfig, ExitPolicy, PeerError, Result,
};
