//! Subprocess plumbing for the 1Password CLI.
//!
//! Everything that spawns a process goes through the [`CommandRunner`] trait
//! so the session and shell logic can be exercised against a scripted
//! runner in tests.

use crate::{OppyError, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// One fully specified subprocess call.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl Invocation {
    /// Creates an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Data written to the child's stdin before waiting on it.
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Value of an environment variable set on this invocation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Renders `program arg...`. Environment values and stdin are never shown,
/// so this is safe to log.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Exit code and output of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when killed by a signal
    pub code: i32,
    /// Captured stdout (empty for streamed runs)
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true when the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs subprocesses.
///
/// A non-zero exit is reported through [`CommandOutput::code`], not as an
/// error; callers decide what a failure means.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs to completion with stdout and stderr captured.
    ///
    /// # Errors
    ///
    /// - [`OppyError::NotInstalled`] if the program cannot be found
    /// - [`OppyError::Io`] for other spawn or pipe failures
    async fn capture(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Runs with stdout attached to the terminal. Stderr is echoed as it
    /// arrives and also captured.
    ///
    /// # Errors
    ///
    /// Same as [`capture`](Self::capture), plus [`OppyError::Interrupted`]
    /// when the user presses Ctrl-C while the child runs.
    async fn stream(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs real processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).kill_on_drop(true);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn capture(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "running");

        let mut cmd = Self::command(invocation);
        cmd.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&invocation.program, e))?;

        if let (Some(data), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            stdin.write_all(data.as_bytes()).await?;
            stdin.flush().await?;
        }

        let output = child.wait_with_output().await?;
        let code = output.status.code().unwrap_or(-1);
        debug!(command = %invocation, code, "finished");

        Ok(CommandOutput {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "streaming");

        let mut cmd = Self::command(invocation);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&invocation.program, e))?;
        let stderr = child.stderr.take();

        let tee = async move {
            let mut captured = Vec::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr);
                let mut out = tokio::io::stderr();
                let mut line = Vec::new();
                loop {
                    line.clear();
                    if reader.read_until(b'\n', &mut line).await? == 0 {
                        break;
                    }
                    out.write_all(&line).await?;
                    captured.extend_from_slice(&line);
                }
                out.flush().await?;
            }
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&captured).into_owned())
        };

        let finished = tokio::select! {
            result = async { tokio::try_join!(tee, child.wait()) } => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match finished {
            Some(result) => {
                let (stderr, status) = result?;
                let code = status.code().unwrap_or(-1);
                debug!(command = %invocation, code, "finished");
                Ok(CommandOutput {
                    code,
                    stdout: String::new(),
                    stderr,
                })
            }
            None => {
                let _ = child.kill().await;
                debug!(command = %invocation, "interrupted");
                Err(OppyError::Interrupted)
            }
        }
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> OppyError {
    if e.kind() == std::io::ErrorKind::NotFound {
        OppyError::NotInstalled(format!("{} command not found", program))
    } else {
        OppyError::Io(e)
    }
}

/// Checks if a command-line tool is available in PATH.
///
/// Absolute and relative paths are checked the same way.
pub async fn check_command_exists(program: &str) -> Result<bool> {
    let status = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(OppyError::Io)?;

    Ok(status.success())
}

/// Source of the master password for `op signin`.
pub trait PasswordPrompt: Send + Sync {
    /// Asks for a password, showing `prompt`.
    fn read_password(&self, prompt: &str) -> Result<String>;
}

/// Reads the password from the controlling terminal without echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> Result<String> {
        rpassword::prompt_password(prompt).map_err(OppyError::Io)
    }
}
