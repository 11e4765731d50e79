use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use nanoframe_peer::{Engine, EngineConfig, ExitPolicy, HandshakeConfig};
use nanoframe_transport::{resolve_or_fallback, EngineCommand, EngineOrigin, ResolverConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod doctor;
pub mod echo_engine;
pub mod envinfo;
pub mod ping;
pub mod resolve;
pub mod run;
pub mod version;

/// How long a finished command waits for the engine to exit after closing
/// its input, before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the engine, issue one request, and print the result.
    Call(CallArgs),
    /// Launch the engine and report handshake latency.
    Ping(PingArgs),
    /// Supervise the engine, print its notifications, and exit with its code.
    Run(RunArgs),
    /// Show which engine command would be launched and why.
    Resolve(ResolveArgs),
    /// Stub engine speaking the wire protocol on stdio.
    EchoEngine(EchoEngineArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format).await,
        Command::Ping(args) => ping::run(args, format).await,
        Command::Run(args) => run::run(args, format).await,
        Command::Resolve(args) => resolve::run(args, format),
        Command::EchoEngine(args) => echo_engine::run(args).await,
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format).await,
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

/// Engine selection shared by the commands that launch one.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine executable. Skips platform resolution.
    #[arg(long, value_name = "PATH", env = "NANOF_ENGINE")]
    pub engine: Option<PathBuf>,
    /// Arguments passed to the engine.
    #[arg(last = true, value_name = "ENGINE_ARGS")]
    pub engine_args: Vec<String>,
}

impl EngineArgs {
    pub fn command(&self) -> EngineCommand {
        let command = match &self.engine {
            Some(path) => EngineCommand::new(path),
            None => resolve_or_fallback(&ResolverConfig::from_env()),
        };
        if self.engine_args.is_empty() {
            return command;
        }
        // cargo needs `--` before arguments meant for the engine binary.
        let command = if command.origin == EngineOrigin::Source {
            command.with_arg("--")
        } else {
            command
        };
        command.with_args(&self.engine_args)
    }

    pub fn config(&self, exit_policy: ExitPolicy, handshake_timeout: Duration) -> EngineConfig {
        EngineConfig::default()
            .with_command(self.command())
            .with_handshake(HandshakeConfig::default().with_timeout(handshake_timeout))
            .with_exit_policy(exit_policy)
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name (e.g. window.setTitle).
    pub method: String,
    /// JSON params. Default: {}.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    /// Deadline for the handshake and for the call (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Handshake deadline (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Handshake deadline (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
    /// Let the engine supervisor terminate this process with the engine's
    /// exit code instead of returning it through the command.
    #[arg(long, hide = true)]
    pub propagate_exit: bool,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug, Default)]
pub struct ResolveArgs {}

#[derive(Args, Debug, Default)]
pub struct EchoEngineArgs {
    /// Exit immediately with this code, without reading stdin.
    #[arg(long, value_name = "CODE")]
    pub exit_code: Option<i32>,
    /// Read requests but never answer them.
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Also launch the resolved engine and run the liveness handshake.
    #[arg(long)]
    pub handshake: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

/// Parse a duration like `5s`, `150ms`, or `3` (seconds).
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Close the engine's input and give it [`SHUTDOWN_GRACE`] to exit before
/// killing it.
pub async fn shutdown(engine: &Engine) {
    engine.connection().close("command finished");
    if tokio::time::timeout(SHUTDOWN_GRACE, engine.wait()).await.is_ok() {
        return;
    }

    tracing::warn!(pid = engine.pid(), "engine did not exit after input closed, killing");
    if let Err(err) = engine.kill(None) {
        tracing::debug!(error = %err, "kill failed");
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, engine.wait()).await;
}
