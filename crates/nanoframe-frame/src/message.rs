use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self::new(message),
            Value::Object(_) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| Self::new(value.to_string())),
            other => Self::new(other.to_string()),
        }
    }
}

/// A call that expects a response with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// An unsolicited event. Carries no id and is never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// One line of the protocol, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Why a line could not be classified as a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error("not valid JSON: {0}")]
    InvalidJson(String),
    #[error("not a JSON object")]
    NotAnObject,
    #[error("id is not a non-negative integer")]
    InvalidId,
    #[error("neither a response nor a method call")]
    UnknownShape,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
}

#[derive(Serialize)]
struct WireResult<'a> {
    jsonrpc: &'static str,
    id: u64,
    result: &'a Value,
}

#[derive(Serialize)]
struct WireError<'a> {
    jsonrpc: &'static str,
    id: u64,
    error: &'a RpcError,
}

impl Message {
    /// Classify one line.
    ///
    /// An object with an `id` and a `result` or `error` member is a response;
    /// otherwise a string `method` makes it a notification (no `id`) or a
    /// request.
    ///
    /// Engines written in loosely typed languages send `"id":1.0` and
    /// `"error":false`, so an integral float id is accepted and a falsy
    /// `error` (`null`, `false`, `0`, `""`) counts as success.
    pub fn decode(line: &[u8]) -> Result<Message, Malformed> {
        let value: Value =
            serde_json::from_slice(line).map_err(|e| Malformed::InvalidJson(e.to_string()))?;
        let Value::Object(mut obj) = value else {
            return Err(Malformed::NotAnObject);
        };

        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            let id = take_id(&obj)?;
            let outcome = match obj.remove("error") {
                Some(error) if !is_falsy(&error) => Err(RpcError::from_value(error)),
                _ => Ok(obj.remove("result").unwrap_or(Value::Null)),
            };
            return Ok(Message::Response(Response { id, outcome }));
        }

        let Some(Value::String(method)) = obj.remove("method") else {
            return Err(Malformed::UnknownShape);
        };
        let params = obj.remove("params").unwrap_or(Value::Null);

        if obj.contains_key("id") {
            let id = take_id(&obj)?;
            Ok(Message::Request(Request { id, method, params }))
        } else {
            Ok(Message::Notification(Notification { method, params }))
        }
    }

    /// Serialize to a single JSON object, without the line terminator.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Message::Request(req) => serde_json::to_vec(&WireRequest {
                jsonrpc: JSONRPC_VERSION,
                id: req.id,
                method: &req.method,
                params: &req.params,
            }),
            Message::Notification(note) => serde_json::to_vec(&WireNotification {
                jsonrpc: JSONRPC_VERSION,
                method: &note.method,
                params: &note.params,
            }),
            Message::Response(Response {
                id,
                outcome: Ok(result),
            }) => serde_json::to_vec(&WireResult {
                jsonrpc: JSONRPC_VERSION,
                id: *id,
                result,
            }),
            Message::Response(Response {
                id,
                outcome: Err(error),
            }) => serde_json::to_vec(&WireError {
                jsonrpc: JSONRPC_VERSION,
                id: *id,
                error,
            }),
        }
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(req) => Some(&req.method),
            Message::Notification(note) => Some(&note.method),
            Message::Response(_) => None,
        }
    }
}

/// Largest integer every JSON implementation represents exactly.
const MAX_SAFE_ID: f64 = 9_007_199_254_740_991.0;

fn take_id(obj: &Map<String, Value>) -> Result<u64, Malformed> {
    let Some(Value::Number(id)) = obj.get("id") else {
        return Err(Malformed::InvalidId);
    };
    if let Some(id) = id.as_u64() {
        return Ok(id);
    }
    match id.as_f64() {
        Some(id) if (0.0..=MAX_SAFE_ID).contains(&id) && id.fract() == 0.0 => Ok(id as u64),
        _ => Err(Malformed::InvalidId),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Message::Response(value)
    }
}

impl From<Notification> for Message {
    fn from(value: Notification) -> Self {
        Message::Notification(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let msg = Message::from(Request::new(1, "window.setTitle", json!({"title": "Hi"})));
        let encoded: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "id": 1, "method": "window.setTitle", "params": {"title": "Hi"}})
        );
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn response_with_result() {
        let msg = Message::decode(br#"{"jsonrpc":"2.0","id":7,"result":"pong"}"#).unwrap();
        assert_eq!(msg, Message::Response(Response::result(7, json!("pong"))));
    }

    #[test]
    fn response_with_error() {
        let msg = Message::decode(
            br#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let Message::Response(resp) = msg else {
            panic!("expected response");
        };
        let err = resp.outcome.unwrap_err();
        assert_eq!(err.message, "Method not found");
        assert_eq!(err.code, Some(-32601));
        assert_eq!(err.to_string(), "Method not found");
    }

    #[test]
    fn null_error_counts_as_success() {
        let msg = Message::decode(br#"{"id":3,"result":5,"error":null}"#).unwrap();
        assert_eq!(msg, Message::Response(Response::result(3, json!(5))));
    }

    #[test]
    fn falsy_error_counts_as_success() {
        for line in [
            &br#"{"id":3,"result":5,"error":false}"#[..],
            br#"{"id":3,"result":5,"error":0}"#,
            br#"{"id":3,"result":5,"error":""}"#,
        ] {
            assert_eq!(
                Message::decode(line).unwrap(),
                Message::Response(Response::result(3, json!(5)))
            );
        }
    }

    #[test]
    fn integral_float_id_correlates() {
        let msg = Message::decode(br#"{"id":1.0,"result":"pong"}"#).unwrap();
        assert_eq!(msg, Message::Response(Response::result(1, json!("pong"))));
        assert_eq!(
            Message::decode(br#"{"id":1.5,"result":"pong"}"#),
            Err(Malformed::InvalidId)
        );
        assert_eq!(
            Message::decode(br#"{"id":-1,"result":"pong"}"#),
            Err(Malformed::InvalidId)
        );
    }

    #[test]
    fn error_without_message_still_fails() {
        let msg = Message::decode(br#"{"id":4,"error":"boom"}"#).unwrap();
        let Message::Response(resp) = msg else {
            panic!("expected response");
        };
        assert_eq!(resp.outcome.unwrap_err().message, "boom");
    }

    #[test]
    fn notification_has_no_id() {
        let msg =
            Message::decode(br#"{"jsonrpc":"2.0","method":"window.closed","params":{"windowId":"w1"}}"#)
                .unwrap();
        assert_eq!(
            msg,
            Message::Notification(Notification::new("window.closed", json!({"windowId": "w1"})))
        );
        assert_eq!(msg.method(), Some("window.closed"));
    }

    #[test]
    fn notification_without_params() {
        let msg = Message::decode(br#"{"method":"app.ready"}"#).unwrap();
        assert_eq!(msg, Message::Notification(Notification::new("app.ready", Value::Null)));
    }

    #[test]
    fn method_with_id_is_a_request() {
        let msg = Message::decode(br#"{"id":9,"method":"host.ask","params":[]}"#).unwrap();
        assert_eq!(msg, Message::Request(Request::new(9, "host.ask", json!([]))));
    }

    #[test]
    fn malformed_lines_are_classified() {
        assert!(matches!(
            Message::decode(b"not json"),
            Err(Malformed::InvalidJson(_))
        ));
        assert_eq!(Message::decode(b"[1,2]"), Err(Malformed::NotAnObject));
        assert_eq!(
            Message::decode(br#"{"id":"abc","result":1}"#),
            Err(Malformed::InvalidId)
        );
        assert_eq!(
            Message::decode(br#"{"id":null,"error":{"code":-32700,"message":"Parse error"}}"#),
            Err(Malformed::InvalidId)
        );
        assert_eq!(
            Message::decode(br#"{"jsonrpc":"2.0"}"#),
            Err(Malformed::UnknownShape)
        );
        assert_eq!(
            Message::decode(br#"{"method":42}"#),
            Err(Malformed::UnknownShape)
        );
    }

    #[test]
    fn error_response_encodes_error_member() {
        let msg = Message::from(Response::error(
            5,
            RpcError::new("Method not found").with_code(-32601),
        ));
        let encoded: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "id": 5, "error": {"code": -32601, "message": "Method not found"}})
        );
    }
}
