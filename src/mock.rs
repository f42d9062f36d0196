//! Test doubles for code that shells out to `op`.
//!
//! [`ScriptedRunner`] answers every invocation through a closure and records
//! what it was asked to run; [`FixedPassword`] answers password prompts.
//! [`ScriptedInput`] and [`SharedBuffer`] drive the shell without a terminal.

use crate::cli::{CommandOutput, CommandRunner, Invocation, PasswordPrompt};
use crate::shell::LineSource;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

type Handler = dyn Fn(&Invocation) -> Result<CommandOutput> + Send + Sync;

/// Command runner driven by a closure.
///
/// # Example
///
/// ```
/// use oppy::cli::{CommandOutput, CommandRunner, Invocation};
/// use oppy::mock::ScriptedRunner;
///
/// #[tokio::main]
/// async fn main() -> oppy::Result<()> {
///     let runner = ScriptedRunner::new(|inv| Ok(CommandOutput::ok(inv.args.join(" "))));
///     let output = runner.capture(&Invocation::new("op").arg("whoami")).await?;
///     assert_eq!(output.stdout, "whoami");
///     assert_eq!(runner.calls().len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ScriptedRunner {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of invocations whose first argument is `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls()
            .iter()
            .filter(|inv| inv.args.first().map(String::as_str) == Some(subcommand))
            .count()
    }

    fn respond(&self, invocation: &Invocation) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        (self.handler)(invocation)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn capture(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.respond(invocation)
    }

    async fn stream(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.respond(invocation)
    }
}

/// Password prompt that always answers with the same password.
#[derive(Debug, Clone)]
pub struct FixedPassword {
    password: String,
    asked: Arc<Mutex<usize>>,
}

impl FixedPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            asked: Arc::new(Mutex::new(0)),
        }
    }

    /// How many times a password was requested.
    pub fn times_asked(&self) -> usize {
        self.asked.lock().map(|n| *n).unwrap_or(0)
    }
}

impl PasswordPrompt for FixedPassword {
    fn read_password(&self, _prompt: &str) -> Result<String> {
        if let Ok(mut n) = self.asked.lock() {
            *n += 1;
        }
        Ok(self.password.clone())
    }
}

/// Shell input from a fixed list of lines; runs out like end of input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

/// Writer whose contents can be read back after it is moved into a shell.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
