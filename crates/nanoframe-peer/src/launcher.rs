use nanoframe_transport::{
    resolve_or_fallback, EngineCommand, EngineProcess, ExitReport, ResolverConfig,
};
use serde_json::Value;

use crate::connection::{Connection, ConnectionCloser, ConnectionConfig, PendingCall};
use crate::error::Result;
use crate::handshake::{handshake, HandshakeConfig, HandshakeResult};

/// What to do with the host process when the engine exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Terminate the host with the engine's exit code.
    #[default]
    Propagate,
    /// Only close the connection; the caller observes the exit through
    /// [`Engine::wait`].
    Detach,
}

/// Everything needed to start an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Used when `command` is `None`.
    pub resolver: ResolverConfig,
    /// Explicit command, bypassing the resolver.
    pub command: Option<EngineCommand>,
    pub handshake: HandshakeConfig,
    pub connection: ConnectionConfig,
    pub exit_policy: ExitPolicy,
}

impl Default for EngineConfig {
    /// Resolver settings come from the `NANOF_*` environment variables.
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::from_env(),
            command: None,
            handshake: HandshakeConfig::default(),
            connection: ConnectionConfig::default(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_command(mut self, command: EngineCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    /// The command [`Engine::spawn`] will run.
    pub fn resolved_command(&self) -> EngineCommand {
        match &self.command {
            Some(command) => command.clone(),
            None => resolve_or_fallback(&self.resolver),
        }
    }
}

/// A running engine and the connection to it.
#[derive(Debug)]
pub struct Engine {
    process: EngineProcess,
    connection: Connection,
    handshake: HandshakeConfig,
}

impl Engine {
    /// Resolve, spawn, and wire up the engine without waiting for it.
    ///
    /// The connection starts in `Starting`; see [`ready`](Self::ready).
    pub fn spawn(config: EngineConfig) -> Result<Self> {
        let command = config.resolved_command();
        tracing::info!(command = %command, origin = %command.origin, "launching engine");

        let (process, stdio) = EngineProcess::spawn(&command)?;
        let connection = Connection::from_streams(stdio.stdout, stdio.stdin, config.connection);

        tokio::spawn(supervise(
            process.clone(),
            connection.closer(),
            config.exit_policy,
        ));

        Ok(Self {
            process,
            connection,
            handshake: config.handshake,
        })
    }

    /// Spawn the engine and wait for the liveness handshake.
    pub async fn launch(config: EngineConfig) -> Result<Self> {
        let engine = Self::spawn(config)?;
        engine.ready().await?;
        Ok(engine)
    }

    /// Run the liveness handshake.
    pub async fn ready(&self) -> Result<HandshakeResult> {
        handshake(&self.connection, &self.handshake).await
    }

    pub fn call(&self, method: impl Into<String>, params: Value) -> PendingCall {
        self.connection.call(method, params)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn process(&self) -> &EngineProcess {
        &self.process
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Signal the engine (default `SIGTERM`). Does not wait for it to exit
    /// and does not touch pending requests; they are rejected once the exit
    /// is observed.
    pub fn kill(&self, signal: Option<i32>) -> Result<()> {
        self.process.kill(signal)?;
        Ok(())
    }

    /// Close the engine's input stream and wait for it to exit.
    pub async fn quit(&self) -> ExitReport {
        self.connection.close("engine quit requested");
        self.process.wait().await
    }

    /// Wait for the engine to exit.
    pub async fn wait(&self) -> ExitReport {
        self.process.wait().await
    }
}

/// Spawn and handshake with `config`.
pub async fn launch(config: EngineConfig) -> Result<Engine> {
    Engine::launch(config).await
}

async fn supervise(process: EngineProcess, closer: ConnectionCloser, policy: ExitPolicy) {
    let report = process.wait().await;
    closer.close(&format!("engine exited with code {}", report.code));

    match policy {
        ExitPolicy::Propagate => {
            tracing::info!(code = report.code, signal = report.signal, "engine exited, terminating host");
            std::process::exit(report.code);
        }
        ExitPolicy::Detach => {
            tracing::debug!(code = report.code, signal = report.signal, "engine exited");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::error::PeerError;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn sh(script: &str) -> EngineConfig {
        EngineConfig::default()
            .with_command(EngineCommand::new("/bin/sh").with_args(["-c", script]))
            .with_exit_policy(ExitPolicy::Detach)
    }

    // Answers every line with a pong for id 1.
    const PONG_ENGINE: &str =
        r#"while read -r line; do printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":"pong"}'; done"#;

    #[tokio::test]
    async fn launch_completes_handshake() {
        let engine = tokio::time::timeout(TEST_TIMEOUT, Engine::launch(sh(PONG_ENGINE)))
            .await
            .expect("launch should not time out")
            .expect("launch should succeed");
        assert_eq!(engine.connection().state(), ConnectionState::Ready);
        assert!(engine.pid().is_some());

        let report = tokio::time::timeout(TEST_TIMEOUT, engine.quit())
            .await
            .expect("engine should exit after stdin closes");
        assert_eq!(report.code, 0);
    }

    #[tokio::test]
    async fn engine_exit_rejects_pending_calls() {
        let engine = Engine::spawn(sh("read -r line; exit 3")).expect("spawn should succeed");
        let call = engine.call("window.create", json!({}));

        let err = tokio::time::timeout(TEST_TIMEOUT, call)
            .await
            .expect("call should settle")
            .unwrap_err();
        assert!(err.is_closed(), "{err:?}");

        let report = tokio::time::timeout(TEST_TIMEOUT, engine.wait())
            .await
            .expect("engine should exit");
        assert_eq!(report.code, 3);
        tokio::time::timeout(TEST_TIMEOUT, engine.connection().closed())
            .await
            .expect("connection should close");
    }

    #[tokio::test]
    async fn kill_terminates_engine() {
        let engine = Engine::spawn(sh("sleep 30")).expect("spawn should succeed");
        engine.kill(None).expect("kill should succeed");

        let report = tokio::time::timeout(TEST_TIMEOUT, engine.wait())
            .await
            .expect("engine should exit");
        assert_eq!(report.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn missing_engine_fails_to_spawn() {
        let config = EngineConfig::default()
            .with_command(EngineCommand::new("nanoframe-core-definitely-missing"))
            .with_exit_policy(ExitPolicy::Detach);
        let err = Engine::spawn(config).unwrap_err();
        assert!(matches!(err, PeerError::Transport(ref e) if e.is_not_found()), "{err:?}");
    }

    #[tokio::test]
    async fn explicit_command_wins_over_resolver() {
        let command = EngineCommand::new("/bin/true");
        let config = EngineConfig::default().with_command(command.clone());
        assert_eq!(config.resolved_command(), command);
    }
}
