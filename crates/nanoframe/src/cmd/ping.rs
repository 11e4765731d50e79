use nanoframe_peer::{Engine, ExitPolicy};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::{parse_duration, shutdown, PingArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{millis, print_json_line, schema_id, OutputFormat};

#[derive(Serialize)]
struct PingOutput {
    schema_id: String,
    engine: String,
    origin: &'static str,
    pid: Option<u32>,
    response: Value,
    latency_ms: f64,
}

pub async fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = args.engine.config(ExitPolicy::Detach, timeout);
    let command = config.resolved_command();

    let engine = Engine::spawn(config).map_err(|err| peer_error("engine launch failed", err))?;
    let handshake = engine.ready().await;
    let pid = engine.pid();
    shutdown(&engine).await;
    let handshake = handshake.map_err(|err| peer_error("engine handshake failed", err))?;

    let output = PingOutput {
        schema_id: schema_id("ping"),
        engine: command.to_string(),
        origin: command.origin.as_str(),
        pid,
        response: handshake.response,
        latency_ms: millis(handshake.elapsed),
    };

    match format {
        OutputFormat::Json => print_json_line(&output),
        OutputFormat::Raw => println!("{}", output.latency_ms),
        _ => {
            println!("engine:   {} ({})", output.engine, output.origin);
            if let Some(pid) = output.pid {
                println!("pid:      {pid}");
            }
            println!("response: {}", output.response);
            println!("latency:  {:.2}ms", output.latency_ms);
        }
    }
    Ok(SUCCESS)
}
