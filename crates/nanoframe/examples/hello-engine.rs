//! Launch the engine, open a window, and print its notifications.
//!
//! Run with:
//!   NANOF_ENGINE=/path/to/nanoframe-core cargo run --example hello-engine --features peer
//!
//! Without a real engine, point it at the CLI's stub engine:
//!   cargo build --features cli
//!   NANOF_STUB=1 NANOF_ENGINE=target/debug/nanoframe \
//!     cargo run --example hello-engine --features peer

use std::time::Duration;

use nanoframe::{launch, EngineConfig};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = EngineConfig::default();
    if std::env::var_os("NANOF_STUB").is_some() {
        let command = config.resolved_command().with_arg("echo-engine");
        config = config.with_command(command);
    }

    let engine = launch(config).await?;
    eprintln!("engine ready (pid {:?})", engine.pid());

    engine.connection().on_notify(|method, params| {
        println!("{method} {params}");
    });

    let window = engine
        .connection()
        .call_with_timeout(
            "window.create",
            json!({"title": "Hello", "width": 640, "height": 480}),
            Duration::from_secs(5),
        )
        .await;
    match window {
        Ok(window) => println!("created {window}"),
        Err(err) => eprintln!("window.create failed: {err}"),
    }

    // Closing the engine's input lets it exit; the exit policy then ends
    // this process with the engine's code.
    engine.quit().await;
    Ok(())
}
