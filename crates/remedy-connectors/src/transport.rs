//! Remote transport
//!
//! One call is one request and one response. A connector never makes more
//! than one call per execute, capture, restore or read.

use crate::error::TransportError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment variables passed through to spawned shells
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "KUBECONFIG", "SYSTEMROOT", "USERPROFILE"];

/// Prefixes of environment variables passed through to spawned shells
const PASSTHROUGH_PREFIXES: &[&str] = &["AWS_"];

/// A fully rendered, validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub line: String,
    /// Written to the remote side's stdin, used to hand over restore payloads
    pub stdin: Option<String>,
}

impl RemoteCommand {
    #[must_use]
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stdin: None,
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Response to one remote call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

/// Delivers rendered commands to a provider
#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Run one command and collect its output
    ///
    /// # Errors
    /// Returns [`TransportError`] when the command could not be delivered.
    /// A delivered command that fails remotely is an `Ok` output with a
    /// non-zero exit code.
    async fn call(&self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError>;
}

/// Shell used to interpret a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// `sh -c`
    Posix,
    /// `pwsh -NoProfile -NonInteractive -Command`
    PowerShell,
}

impl Shell {
    fn program(self) -> &'static str {
        match self {
            Shell::Posix => "sh",
            Shell::PowerShell => "pwsh",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            Shell::Posix => &["-c"],
            Shell::PowerShell => &["-NoProfile", "-NonInteractive", "-Command"],
        }
    }
}

/// Runs commands in a local shell process
///
/// The provider CLIs (`aws`, `kubectl`, PowerShell remoting) do the actual
/// remote work. The child gets a cleared environment plus the credentials
/// and paths those CLIs need.
#[derive(Debug, Clone)]
pub struct ShellTransport {
    shell: Shell,
}

impl ShellTransport {
    #[must_use]
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }

    #[must_use]
    pub fn posix() -> Self {
        Self::new(Shell::Posix)
    }

    #[must_use]
    pub fn powershell() -> Self {
        Self::new(Shell::PowerShell)
    }

    fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(self.shell.program());
        cmd.args(self.shell.args());
        cmd.arg(line);
        cmd.env_clear();
        for (key, value) in std::env::vars() {
            let passes = PASSTHROUGH_ENV.contains(&key.as_str())
                || PASSTHROUGH_PREFIXES.iter().any(|p| key.starts_with(p));
            if passes {
                cmd.env(key, value);
            }
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Abandoned calls (timeout, cancellation) must not leave the child running
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl RemoteTransport for ShellTransport {
    async fn call(&self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        let mut child = self
            .command(&command.line)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.shell.program().to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(input) = &command.stdin {
                stdin.write_all(input.as_bytes()).await?;
            }
            // Dropping closes the pipe so readers see EOF
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        let exit_code = output.status.code().ok_or_else(|| {
            TransportError::Unreachable(format!("{} terminated by signal", self.shell.program()))
        })?;

        Ok(RemoteOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posix_shell_reports_exit_code_and_output() {
        let transport = ShellTransport::posix();

        let out = transport.call(&RemoteCommand::new("echo ready")).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "ready");

        let out = transport
            .call(&RemoteCommand::new("echo broken >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.diagnostic(), "broken");
    }

    #[tokio::test]
    async fn stdin_is_delivered() {
        let transport = ShellTransport::posix();
        let out = transport
            .call(&RemoteCommand::new("cat").with_stdin("{\"replicas\":3}"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "{\"replicas\":3}");
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        std::env::set_var("REMEDY_TRANSPORT_SECRET", "leak");
        let transport = ShellTransport::posix();
        let out = transport
            .call(&RemoteCommand::new("printf '%s' \"${REMEDY_TRANSPORT_SECRET:-unset}\""))
            .await
            .unwrap();
        assert_eq!(out.stdout, "unset");
    }
}
