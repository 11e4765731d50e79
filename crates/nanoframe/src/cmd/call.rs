use nanoframe_peer::{with_timeout, Engine, ExitPolicy, PeerError};
use serde_json::Value;
use tokio::time::Instant;

use crate::cmd::{parse_duration, shutdown, CallArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_call_result, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.params.as_deref())?;

    let engine = Engine::spawn(args.engine.config(ExitPolicy::Detach, timeout))
        .map_err(|err| peer_error("engine launch failed", err))?;
    if let Err(err) = engine.ready().await {
        shutdown(&engine).await;
        return Err(peer_error("engine handshake failed", err));
    }

    let started = Instant::now();
    let call = engine.call(args.method.clone(), params);
    let id = call.id();
    let outcome = with_timeout(call, timeout, PeerError::Timeout(timeout)).await;
    let elapsed = started.elapsed();
    shutdown(&engine).await;

    let result = outcome.map_err(|err| peer_error(&format!("{} failed", args.method), err))?;
    tracing::debug!(id, method = %args.method, elapsed_ms = elapsed.as_millis() as u64, "call completed");
    print_call_result(&args.method, id, elapsed, &result, format);
    Ok(SUCCESS)
}

fn parse_params(raw: Option<&str>) -> CliResult<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    serde_json::from_str(raw)
        .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}")))
}
