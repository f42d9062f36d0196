//! 1Password CLI client.
//!
//! Builds `op` invocations from the effective options and turns their exit
//! status into [`OppyError::Auth`] or [`OppyError::Subprocess`].
//!
//! # Authentication
//!
//! The session token travels in the `OP_SESSION_<domain>` environment
//! variable; it never appears on the command line.

use crate::cli::{CommandOutput, CommandRunner, Invocation};
use crate::config::EffectiveOptions;
use crate::{OppyError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Lowercased openings of the `[ERROR]` messages `op` prints when a
/// session is missing or rejected.
const SESSION_REJECTED: &[&str] = &[
    "you are not currently signed in",
    "you are not signed in",
    "account is not signed in",
    "session expired",
    "invalid session token",
    "authentication required",
];

/// Wrapper `op` puts around failures while setting up its client.
const CLIENT_INIT_PREFIX: &str = "error initializing client:";

/// Name of the environment variable carrying the session for `domain`.
pub fn session_env_var(domain: &str) -> String {
    format!("OP_SESSION_{}", domain)
}

/// Returns true when `stderr` reports a rejected or missing session.
///
/// Only the start of each `[ERROR]` message is inspected. The rest of the
/// message often quotes user input such as item names.
pub fn is_auth_failure(stderr: &str) -> bool {
    stderr.lines().filter_map(error_message).any(|message| {
        let message = message.to_lowercase();
        SESSION_REJECTED.iter().any(|m| message.starts_with(m))
    })
}

/// Message of an `op` `[ERROR]` line, without the tag, timestamp and
/// client-setup wrapper.
fn error_message(line: &str) -> Option<&str> {
    let mut rest = line.trim_start().strip_prefix("[ERROR]")?.trim_start();

    // `2024/01/31 12:00:00`
    for _ in 0..2 {
        let (token, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        let is_stamp = !token.is_empty()
            && token.chars().any(|c| c.is_ascii_digit())
            && token.chars().all(|c| c.is_ascii_digit() || c == '/' || c == ':');
        if !is_stamp {
            break;
        }
        rest = tail.trim_start();
    }

    match rest.get(..CLIENT_INIT_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(CLIENT_INIT_PREFIX) => {
            Some(rest[CLIENT_INIT_PREFIX.len()..].trim_start())
        }
        _ => Some(rest),
    }
}

/// Result of `op signin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    pub token: String,
    /// Expiry stated by the tool, if it printed one
    pub expires_at: Option<DateTime<Utc>>,
}

impl SignIn {
    /// Parses raw sign-in output: the token on the first non-empty line,
    /// optionally followed by an RFC 3339 expiry.
    pub fn parse(stdout: &str) -> Option<Self> {
        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        let token = lines.next()?.to_string();
        let expires_at = lines
            .next()
            .and_then(|l| DateTime::parse_from_rfc3339(l).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Self { token, expires_at })
    }
}

/// An `op` operation that needs a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpCall {
    /// `op item list`
    ListItems,
    /// `op item get <reference>`
    GetItem(String),
    /// Arbitrary arguments typed at the prompt, streamed to the terminal
    Passthrough(Vec<String>),
}

impl OpCall {
    fn streams(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }
}

/// Client for the `op` binary.
pub struct OpClient<R> {
    runner: R,
}

impl<R: CommandRunner> OpClient<R> {
    /// Creates a client running processes through `runner`.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Signs in to `options.domain`, writing `password` to `op`'s stdin.
    ///
    /// # Errors
    ///
    /// - [`OppyError::Auth`] if `op` refuses the password or prints no token
    /// - [`OppyError::NotInstalled`] if `op` is missing
    pub async fn signin(&self, options: &EffectiveOptions, password: &str) -> Result<SignIn> {
        let invocation = Invocation::new(&options.op_path)
            .args(["signin", "--account", options.domain.as_str(), "--raw"])
            .stdin(password);

        let output = self.runner.capture(&invocation).await?;
        if !output.success() {
            return Err(OppyError::Auth(first_line(&output.stderr, "sign-in refused")));
        }

        SignIn::parse(&output.stdout)
            .ok_or_else(|| OppyError::Auth("op signin returned no session token".to_string()))
    }

    /// Runs `call` with `token` and classifies the result.
    pub async fn call(
        &self,
        options: &EffectiveOptions,
        token: &str,
        call: &OpCall,
    ) -> Result<CommandOutput> {
        let invocation = self
            .invocation(options, call)
            .env(session_env_var(&options.domain), token);

        let output = if call.streams() {
            self.runner.stream(&invocation).await?
        } else {
            self.runner.capture(&invocation).await?
        };

        classify(&options.op_path, output)
    }

    /// Runs `op` without a session, e.g. `--version` or `update`.
    pub async fn run_unauthenticated(
        &self,
        options: &EffectiveOptions,
        args: &[&str],
    ) -> Result<CommandOutput> {
        let invocation = Invocation::new(&options.op_path).args(args.iter().copied());
        let output = self.runner.stream(&invocation).await?;
        classify(&options.op_path, output)
    }

    /// Builds the invocation for `call`, without the session variable.
    pub fn invocation(&self, options: &EffectiveOptions, call: &OpCall) -> Invocation {
        let base = Invocation::new(&options.op_path);

        match call {
            OpCall::ListItems => {
                let invocation = base.args(["item", "list", "--format=json"]);
                with_scope(invocation, options, true)
            }
            OpCall::GetItem(reference) => {
                let invocation = base.args(["item", "get", reference.as_str(), "--format=json"]);
                with_scope(invocation, options, true)
            }
            OpCall::Passthrough(args) => {
                let vault_aware = matches!(
                    args.first().map(String::as_str),
                    Some("item") | Some("document")
                ) && !args.iter().any(|a| a == "--vault" || a.starts_with("--vault="));
                with_scope(base.args(args.iter().cloned()), options, vault_aware)
            }
        }
    }
}

/// Parses `op item list --format=json` output.
pub fn parse_item_list(stdout: &str) -> Result<Vec<Value>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(stdout)? {
        Value::Array(items) => Ok(items),
        other => Err(OppyError::Other(anyhow::anyhow!(
            "expected a JSON array of items, got {}",
            kind_of(&other)
        ))),
    }
}

fn with_scope(invocation: Invocation, options: &EffectiveOptions, add_vault: bool) -> Invocation {
    let invocation = match (&options.vault, add_vault) {
        (Some(vault), true) => invocation.args(["--vault", vault.as_str()]),
        _ => invocation,
    };
    invocation.args(["--account", options.domain.as_str()])
}

fn classify(program: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else if is_auth_failure(&output.stderr) {
        Err(OppyError::Auth(first_line(&output.stderr, "session rejected")))
    } else {
        Err(OppyError::Subprocess {
            program: program.to_string(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

fn first_line(text: &str, fallback: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
