use nanoframe_peer::{Engine, ExitPolicy};

use crate::cmd::{parse_duration, RunArgs};
use crate::exit::{peer_error, CliResult};
use crate::output::{print_notification, OutputFormat};

/// Supervise the engine until it exits and hand back its status, which
/// becomes the host's. Ctrl-C forwards `SIGTERM` to the engine first.
///
/// The status is shell-style: the engine's exit code, or `128 + signal` when
/// the engine was killed, so an interrupted run exits 143 rather than 0.
///
/// The engine is detached rather than left to terminate the host itself, so
/// a failed handshake can still be reported before the engine is stopped.
/// `--propagate-exit` hands that job back to the supervisor.
pub async fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let policy = if args.propagate_exit {
        ExitPolicy::Propagate
    } else {
        ExitPolicy::Detach
    };
    let engine = Engine::spawn(args.engine.config(policy, timeout))
        .map_err(|err| peer_error("engine launch failed", err))?;

    if policy == ExitPolicy::Propagate {
        return relay_until_exit(engine, format).await;
    }

    let mut notes = engine.connection().subscribe();

    if let Err(err) = engine.ready().await {
        if err.is_closed() {
            // The engine is already gone; report its status, not ours.
            return Ok(engine.wait().await.shell_code());
        }
        let _ = engine.kill(None);
        return Err(peer_error("engine handshake failed", err));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            report = engine.wait() => return Ok(report.shell_code()),
            note = notes.recv() => match note {
                Some(note) => print_notification(&note, format),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("interrupt received, stopping engine");
                if let Err(err) = engine.kill(None) {
                    tracing::debug!(error = %err, "engine already stopped");
                }
            }
        }
    }

    Ok(engine.wait().await.shell_code())
}

/// Print notifications until the engine exits. The supervisor ends the
/// process at that point, so this never returns on its own.
async fn relay_until_exit(engine: Engine, format: OutputFormat) -> CliResult<i32> {
    let mut notes = engine.connection().subscribe();
    if let Err(err) = engine.ready().await {
        tracing::warn!(error = %err, "engine handshake failed");
    }
    while let Some(note) = notes.recv().await {
        print_notification(&note, format);
    }
    std::future::pending().await
}
