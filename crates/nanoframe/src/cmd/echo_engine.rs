//! A stand-in engine that speaks the wire protocol on stdin/stdout.
//!
//! It exists so the host side can be exercised end to end without a real
//! windowing engine. Methods:
//!
//! | method   | behavior                                                        |
//! |----------|-----------------------------------------------------------------|
//! | `ping`   | answers `"pong"`                                                |
//! | `echo`   | answers with its params                                         |
//! | `fail`   | error `-32000`, message from `params.message`                   |
//! | `notify` | emits a notification (`params.method`, `params.params`)        |
//! | `sleep`  | answers `true` after `params.ms` milliseconds                   |
//! | `noise`  | writes a line that is not JSON, then answers `true`             |
//! | `exit`   | answers `true`, then exits with `params.code`                   |
//!
//! Anything else is answered with `-32601`.

use std::time::Duration;

use nanoframe_frame::{FrameReader, FrameWriter, Message, Notification, Request, Response, RpcError};
use serde_json::{json, Value};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};

use crate::cmd::EchoEngineArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};

const METHOD_NOT_FOUND: i64 = -32601;
const REQUESTED_FAILURE: i64 = -32000;
const NOISE_LINE: &[u8] = b"engine log: this line is not a protocol message";

enum Outbound {
    Message(Message),
    Raw(&'static [u8]),
    /// Acknowledged once everything queued before it has been written.
    Flush(oneshot::Sender<()>),
}

enum Step {
    Continue,
    Exit(i32),
}

pub async fn run(args: EchoEngineArgs) -> CliResult<i32> {
    if let Some(code) = args.exit_code {
        tracing::debug!(code, "exiting without reading input");
        return Ok(code);
    }

    let mut reader = FrameReader::new(tokio::io::stdin());
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(FrameWriter::new(tokio::io::stdout()), rx));

    loop {
        let message = match reader.read_message().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) => return Err(frame_error("engine input failed", err)),
        };

        let request = match message {
            Message::Request(request) => request,
            other => {
                tracing::debug!(method = other.method(), "ignoring non-request message");
                continue;
            }
        };

        if args.silent {
            tracing::debug!(id = request.id, method = %request.method, "not answering");
            continue;
        }

        if let Step::Exit(code) = handle(request, &tx) {
            flush(&tx).await;
            return Ok(code);
        }
    }

    tracing::debug!("input closed, exiting");
    Ok(SUCCESS)
}

fn handle(request: Request, tx: &mpsc::UnboundedSender<Outbound>) -> Step {
    let Request { id, method, params } = request;
    tracing::debug!(id, method = %method, "request");

    let reply = |response: Response| {
        let _ = tx.send(Outbound::Message(response.into()));
    };

    match method.as_str() {
        "ping" => reply(Response::result(id, json!("pong"))),
        "echo" => reply(Response::result(id, params)),
        "fail" => {
            let message = params
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("requested failure");
            reply(Response::error(
                id,
                RpcError::new(message).with_code(REQUESTED_FAILURE),
            ));
        }
        "notify" => {
            let event = params
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("engine.event");
            let event_params = params.get("params").cloned().unwrap_or_else(|| json!({}));
            let _ = tx.send(Outbound::Message(
                Notification::new(event, event_params).into(),
            ));
            reply(Response::result(id, json!(true)));
        }
        "sleep" => {
            let delay = Duration::from_millis(params.get("ms").and_then(Value::as_u64).unwrap_or(0));
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Outbound::Message(Response::result(id, json!(true)).into()));
            });
        }
        "noise" => {
            let _ = tx.send(Outbound::Raw(NOISE_LINE));
            reply(Response::result(id, json!(true)));
        }
        "exit" => {
            reply(Response::result(id, json!(true)));
            let code = params
                .get("code")
                .and_then(Value::as_i64)
                .and_then(|code| i32::try_from(code).ok())
                .unwrap_or(0);
            return Step::Exit(code);
        }
        _ => reply(Response::error(
            id,
            RpcError::new("Method not found").with_code(METHOD_NOT_FOUND),
        )),
    }

    Step::Continue
}

async fn flush(tx: &mpsc::UnboundedSender<Outbound>) {
    let (ack, done) = oneshot::channel();
    if tx.send(Outbound::Flush(ack)).is_ok() {
        let _ = done.await;
    }
}

async fn write_loop<W>(mut writer: FrameWriter<W>, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        let result = match outbound {
            Outbound::Message(message) => writer.send(&message).await,
            Outbound::Raw(line) => writer.send_line(line).await,
            Outbound::Flush(ack) => {
                let _ = ack.send(());
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "engine output closed");
            break;
        }
    }
}
