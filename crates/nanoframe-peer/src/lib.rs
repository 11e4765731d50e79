//! Connection layer for nanoframe.
//!
//! A [`Connection`] sits on top of an engine's stdio streams and provides:
//! - `call(method, params)`, correlated to out-of-order responses by id
//! - notification delivery to a single handler and to any number of
//!   [`NotificationStream`] subscribers
//! - a liveness handshake and a timeout guard
//!
//! [`Engine`] ties a connection to a supervised engine process.
//!
//! ```no_run
//! use nanoframe_peer::{Engine, EngineConfig};
//! use serde_json::json;
//!
//! # async fn demo() -> nanoframe_peer::Result<()> {
//! let engine = Engine::launch(EngineConfig::default()).await?;
//! engine.connection().on_notify(|method, params| {
//!     println!("{method}: {params}");
//! });
//! let id = engine.call("window.create", json!({"title": "Hi"})).await?;
//! println!("created {id}");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod handshake;
pub mod launcher;
pub mod pending;
pub mod router;
pub mod timeout;

pub use connection::{
    Connection, ConnectionConfig, ConnectionState, PendingCall, DEFAULT_SUBSCRIBER_CAPACITY,
};
pub use error::{PeerError, Result};
pub use handshake::{handshake, HandshakeConfig, HandshakeResult, DEFAULT_HANDSHAKE_TIMEOUT};
pub use launcher::{launch, Engine, EngineConfig, ExitPolicy};
pub use pending::{Completion, PendingTable};
pub use router::{NotificationRouter, NotificationStream, NotifyHandler};
pub use timeout::with_timeout;
