use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, watch};

use crate::command::EngineCommand;
use crate::error::{Result, TransportError};

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, or 0 when the OS reports none (e.g. killed by a signal).
    pub code: i32,
    /// Terminating signal, on platforms that have them.
    pub signal: Option<i32>,
}

impl ExitReport {
    /// Report used when the exit status could not be observed.
    pub const UNKNOWN: ExitReport = ExitReport {
        code: 0,
        signal: None,
    };

    /// Shell-style status: the exit code, or `128 + signal` when the engine
    /// was terminated by a signal.
    pub fn shell_code(&self) -> i32 {
        match self.signal {
            Some(signal) => 128 + signal,
            None => self.code,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code().unwrap_or(0),
            signal,
        }
    }
}

/// Host ends of the engine's stdio pipes.
#[derive(Debug)]
pub struct EngineStdio {
    /// Write end: host → engine.
    pub stdin: ChildStdin,
    /// Read end: engine → host.
    pub stdout: ChildStdout,
}

/// Supervised engine process.
///
/// The child itself is owned by a background task that waits for its exit;
/// this handle is cheap to clone and only signals or observes it.
#[derive(Debug, Clone)]
pub struct EngineProcess {
    pid: Option<u32>,
    command: EngineCommand,
    kill_tx: mpsc::UnboundedSender<()>,
    exit_rx: watch::Receiver<Option<ExitReport>>,
}

impl EngineProcess {
    /// Spawn the engine with piped stdin/stdout and inherited stderr.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(command: &EngineCommand) -> Result<(Self, EngineStdio)> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;

        let pid = child.id();
        tracing::debug!(pid, command = %command, origin = %command.origin, "engine spawned");

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(watch_exit(child, kill_rx, exit_tx));

        Ok((
            Self {
                pid,
                command: command.clone(),
                kill_tx,
                exit_rx,
            },
            EngineStdio { stdin, stdout },
        ))
    }

    /// OS process id, if the child was still running when spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The command this process was started from.
    pub fn command(&self) -> &EngineCommand {
        &self.command
    }

    /// Send a termination signal (default `SIGTERM`). Does not wait for exit.
    ///
    /// On platforms without signals the process is killed outright and
    /// `signal` is ignored.
    pub fn kill(&self, signal: Option<i32>) -> Result<()> {
        if self.try_exit().is_some() {
            return Err(TransportError::Exited);
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            let signal = signal.unwrap_or(libc::SIGTERM);
            tracing::debug!(pid, signal, "signalling engine");
            return signal_pid(pid, signal);
        }

        #[cfg(not(unix))]
        let _ = signal;

        self.kill_tx.send(()).map_err(|_| TransportError::Exited)
    }

    /// Exit report, if the engine has already exited.
    pub fn try_exit(&self) -> Option<ExitReport> {
        *self.exit_rx.borrow()
    }

    /// Wait for the engine to exit.
    pub async fn wait(&self) -> ExitReport {
        let mut rx = self.exit_rx.clone();
        let report = match rx.wait_for(Option::is_some).await {
            Ok(report) => (*report).unwrap_or(ExitReport::UNKNOWN),
            Err(_) => ExitReport::UNKNOWN,
        };
        report
    }
}

async fn watch_exit(
    mut child: Child,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    exit_tx: watch::Sender<Option<ExitReport>>,
) {
    let pid = child.id();
    let report = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => ExitReport::from_status(status),
                    Err(err) => {
                        tracing::warn!(pid, error = %err, "failed to observe engine exit");
                        ExitReport::UNKNOWN
                    }
                };
            }
            Some(()) = kill_rx.recv() => {
                if let Err(err) = child.start_kill() {
                    tracing::warn!(pid, error = %err, "failed to kill engine");
                }
            }
        }
    };

    tracing::debug!(pid, code = report.code, signal = report.signal, "engine exited");
    let _ = exit_tx.send(Some(report));
}

#[cfg(unix)]
fn signal_pid(pid: u32, signal: i32) -> Result<()> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| TransportError::Signal {
        pid,
        signal,
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"),
    })?;

    // SAFETY: kill(2) only takes integer arguments and has no memory-safety
    // preconditions; `raw` is the pid of a child we spawned.
    let rc = unsafe { libc::kill(raw, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::Signal {
            pid,
            signal,
            source: std::io::Error::last_os_error(),
        })
    }
}
