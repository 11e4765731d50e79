use std::time::Duration;

use nanoframe_transport::ENGINE_BIN_NAME;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::timeout::with_timeout;

/// Default liveness handshake deadline.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the liveness handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Method sent to the engine. Default: `ping`.
    pub method: String,
    /// Params sent with it. Default: `{}`.
    pub params: Value,
    /// Deadline for the response. Default: 10 seconds.
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            method: "ping".to_string(),
            params: json!({}),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl HandshakeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResult {
    /// Whatever the engine answered (`"pong"` for the reference engine).
    pub response: Value,
    /// Round-trip time of the handshake request.
    pub elapsed: Duration,
}

/// Confirm the engine is alive and move the connection to `Ready`.
///
/// A missing or failed response leaves the connection in `Starting`. If the
/// engine goes away during the handshake the [`PeerError::Closed`] error is
/// returned as is, so callers can tell a dead engine from a silent one.
pub async fn handshake(conn: &Connection, config: &HandshakeConfig) -> Result<HandshakeResult> {
    let started = Instant::now();
    let timeout_error = PeerError::HandshakeFailed(format!(
        "{ENGINE_BIN_NAME} {} timeout after {:?}",
        config.method, config.timeout
    ));

    let call = conn.call(config.method.clone(), config.params.clone());
    let response = match with_timeout(call, config.timeout, timeout_error).await {
        Ok(response) => response,
        Err(PeerError::Rpc { message, .. }) => {
            return Err(PeerError::HandshakeFailed(format!(
                "engine rejected {}: {message}",
                config.method
            )));
        }
        Err(err) => {
            tracing::warn!(method = %config.method, error = %err, "engine handshake failed");
            return Err(err);
        }
    };

    let elapsed = started.elapsed();
    conn.mark_ready();
    tracing::info!(method = %config.method, elapsed_ms = elapsed.as_millis() as u64, "engine ready");
    Ok(HandshakeResult { response, elapsed })
}

#[cfg(test)]
mod tests {
    use nanoframe_frame::{FrameReader, FrameWriter, Message, Response, RpcError};
    use tokio::io::DuplexStream;

    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionState};

    fn pair() -> (
        Connection,
        FrameReader<DuplexStream>,
        FrameWriter<DuplexStream>,
    ) {
        let (host_read, engine_write) = tokio::io::duplex(4096);
        let (engine_read, host_write) = tokio::io::duplex(4096);
        let conn = Connection::from_streams(host_read, host_write, ConnectionConfig::default());
        (conn, FrameReader::new(engine_read), FrameWriter::new(engine_write))
    }

    async fn answer_ping(
        reader: &mut FrameReader<DuplexStream>,
        writer: &mut FrameWriter<DuplexStream>,
        reply: impl FnOnce(u64) -> Response,
    ) {
        let Some(Message::Request(request)) = reader.read_message().await.unwrap() else {
            panic!("expected ping request");
        };
        assert_eq!(request.method, "ping");
        assert_eq!(request.params, json!({}));
        writer.send(&Message::from(reply(request.id))).await.unwrap();
    }

    #[tokio::test]
    async fn pong_makes_connection_ready() {
        let (conn, mut reader, mut writer) = pair();
        let engine = tokio::spawn(async move {
            answer_ping(&mut reader, &mut writer, |id| Response::result(id, json!("pong"))).await;
            (reader, writer)
        });

        let result = handshake(&conn, &HandshakeConfig::default())
            .await
            .expect("handshake should succeed");
        assert_eq!(result.response, json!("pong"));
        assert_eq!(conn.state(), ConnectionState::Ready);
        let _streams = engine.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_engine_fails_after_deadline() {
        let (conn, _reader, _writer) = pair();
        let started = Instant::now();

        let err = handshake(&conn, &HandshakeConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PeerError::HandshakeFailed(_)), "{err:?}");
        assert!(err.to_string().contains("nanoframe-core ping timeout"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(10_100), "{elapsed:?}");
        assert_eq!(conn.state(), ConnectionState::Starting);
    }

    #[tokio::test]
    async fn rejected_ping_fails_handshake() {
        let (conn, mut reader, mut writer) = pair();
        let engine = tokio::spawn(async move {
            answer_ping(&mut reader, &mut writer, |id| {
                Response::error(id, RpcError::new("not yet").with_code(-32000))
            })
            .await;
            (reader, writer)
        });

        let err = handshake(&conn, &HandshakeConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "handshake failed: engine rejected ping: not yet");
        assert_eq!(conn.state(), ConnectionState::Starting);
        let _streams = engine.await.unwrap();
    }

    #[tokio::test]
    async fn engine_gone_reports_closed() {
        let (conn, reader, writer) = pair();
        drop((reader, writer));

        let err = handshake(&conn, &HandshakeConfig::default().with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_closed(), "{err:?}");
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
