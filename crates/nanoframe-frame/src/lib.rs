//! Newline-delimited JSON-RPC framing for nanoframe.
//!
//! Wire format: one JSON object per line, UTF-8, terminated by `\n`.
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"ping","params":{}}
//! {"jsonrpc":"2.0","id":1,"result":"pong"}
//! {"jsonrpc":"2.0","method":"window.closed","params":{"windowId":"w1"}}
//! ```
//!
//! Inbound lines are classified into [`Message`]s. Lines that are blank,
//! not JSON, or of an unknown shape are dropped without surfacing an error.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_line, encode_line, FrameConfig, LineCodec, MessageCodec, DEFAULT_MAX_LINE, NEWLINE,
};
pub use error::{FrameError, Result};
pub use message::{Malformed, Message, Notification, Request, Response, RpcError, JSONRPC_VERSION};
pub use reader::FrameReader;
pub use writer::FrameWriter;
