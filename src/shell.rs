//! The interactive shell.
//!
//! Lines are parsed into a [`ShellCommand`]. Built-in commands are handled
//! here; anything else is forwarded to `op` with the current session.

use crate::cli::{CommandRunner, PasswordPrompt};
use crate::config::{parse_bool, EffectiveOptions};
use crate::dispatch::Dispatcher;
use crate::item::{choice_label, ItemSummary};
use crate::item_cache::ItemCache;
use crate::op::OpCall;
use crate::query::Query;
use crate::telemetry::LogHandle;
use crate::validation::validate_argument;
use crate::{OppyError, Result, SecretStore};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config as ReadlineConfig, Context as ReadlineContext, Editor, Helper};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use tracing::{debug, warn};

/// Prompt shown before each command.
pub const PROMPT: &str = "(op ➜) ";

/// Names offered by tab completion.
pub const COMMAND_NAMES: &[&str] = &[
    "bye", "exit", "get", "getconf", "help", "list", "login", "quit", "refresh", "search",
    "session", "setdebug", "setvault", "update", "version",
];

const HELP: &str = "\
Built-in commands:
  login               sign in again and cache the new session
  session             print the current session token
  getconf             print the active options
  setvault <name>     restrict item commands to a vault (null clears it)
  setdebug <yes|no>   toggle debug logging
  list                print all items as JSON
  refresh             reload the item list from 1Password
  get <id|title>      print one item's title, url, username and password
  search <query>      find items, e.g. search title=\"Git*\" | bank
  version             op --version
  update              op update
  bye                 leave the shell
Anything else is passed to op, e.g. `whoami` or `item list --categories Login`.";

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Login,
    Session,
    GetConf,
    SetVault(String),
    SetDebug(String),
    Version,
    Update,
    List,
    Refresh,
    Get(String),
    Search(String),
    Help,
    Exit,
    /// Arguments for `op`, already split shell-style
    Op(Vec<String>),
}

impl ShellCommand {
    /// Parses one line of input.
    ///
    /// # Errors
    ///
    /// Returns [`OppyError::InvalidArgument`] when a forwarded command has
    /// unbalanced quotes.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "login" => Self::Login,
            "session" => Self::Session,
            "getconf" => Self::GetConf,
            "setvault" => Self::SetVault(rest.to_string()),
            "setdebug" => Self::SetDebug(rest.to_string()),
            "version" => Self::Version,
            "update" => Self::Update,
            "list" => Self::List,
            "refresh" => Self::Refresh,
            "get" => Self::Get(rest.to_string()),
            "search" => Self::Search(rest.to_string()),
            "help" | "?" => Self::Help,
            "bye" | "exit" | "quit" | "EOF" => Self::Exit,
            _ => {
                let mut args = shell_words::split(line).map_err(|e| {
                    OppyError::InvalidArgument(format!("cannot parse command: {e}"))
                })?;
                if args.first().map(String::as_str) == Some("op") {
                    args.remove(0);
                }
                if args.is_empty() {
                    Self::Empty
                } else {
                    Self::Op(args)
                }
            }
        };

        Ok(command)
    }
}

/// What the loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Answer to a numbered choice prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Index(usize),
    Abort,
    Invalid,
}

/// Interprets the user's answer to a list of `count` choices.
pub fn parse_choice(input: &str, count: usize) -> Choice {
    let input = input.trim();
    match input.parse::<usize>() {
        Ok(index) if index < count => Choice::Index(index),
        Ok(_) => Choice::Invalid,
        Err(_) if matches!(input, "q" | "quit" | "exit") => Choice::Abort,
        Err(_) => Choice::Invalid,
    }
}

/// Parses the argument of `setdebug`. Unrecognized values yield `None`.
pub fn parse_debug_toggle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" => Some(true),
        "n" | "f" => Some(false),
        other => parse_bool(other),
    }
}

/// Where the shell reads lines from.
pub trait LineSource {
    /// Reads one line. `Ok(None)` means the user wants to leave
    /// (end of input or Ctrl-C at the prompt).
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Line editor with command-name completion.
pub type ShellEditor = Editor<CommandCompleter, DefaultHistory>;

impl LineSource for ShellEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.add_history_entry(line.as_str()) {
                        debug!(error = %e, "history entry not recorded");
                    }
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates the interactive line editor.
pub fn build_editor() -> Result<ShellEditor> {
    let config = ReadlineConfig::builder().auto_add_history(false).build();
    let mut editor = ShellEditor::with_config(config)?;
    editor.set_helper(Some(CommandCompleter::new(COMMAND_NAMES)));
    Ok(editor)
}

/// Completes built-in command names in the first word of a line.
#[derive(Debug)]
pub struct CommandCompleter {
    commands: Vec<String>,
}

impl CommandCompleter {
    pub fn new(commands: &[&str]) -> Self {
        Self {
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    fn complete_token(&self, token: &str) -> Vec<String> {
        self.commands
            .iter()
            .filter(|candidate| candidate.starts_with(token))
            .cloned()
            .collect()
    }
}

impl Helper for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Highlighter for CommandCompleter {}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &ReadlineContext<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let safe_pos = pos.min(line.len());
        let prefix = &line[..safe_pos];
        if prefix.contains(char::is_whitespace) {
            return Ok((safe_pos, Vec::new()));
        }

        let matches = self
            .complete_token(prefix)
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((0, matches))
    }
}

/// Shell state for one session.
pub struct Shell<S, R, P> {
    options: EffectiveOptions,
    dispatcher: Dispatcher<S, R, P>,
    items: Vec<Value>,
    log: Option<LogHandle>,
    out: Box<dyn Write + Send>,
}

impl<S, R, P> Shell<S, R, P>
where
    S: SecretStore,
    R: CommandRunner,
    P: PasswordPrompt,
{
    pub fn new(
        options: EffectiveOptions,
        dispatcher: Dispatcher<S, R, P>,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            options,
            dispatcher,
            items: Vec::new(),
            log: None,
            out,
        }
    }

    /// Lets `setdebug` change the log level.
    pub fn with_log_handle(mut self, log: Option<LogHandle>) -> Self {
        self.log = log;
        self
    }

    /// Options currently in effect.
    pub fn options(&self) -> &EffectiveOptions {
        &self.options
    }

    /// Greets the user and makes sure a session exists.
    ///
    /// # Errors
    ///
    /// Fails when no session can be obtained; the caller should exit.
    pub async fn start(&mut self) -> Result<()> {
        writeln!(self.out, "Welcome to the 1Password shell ({})!", self.options.profile)?;
        self.dispatcher.session(&self.options).await?;
        Ok(())
    }

    /// Reads and runs commands until the user leaves.
    pub async fn run(&mut self, input: &mut dyn LineSource) -> Result<()> {
        loop {
            let Some(line) = input.read_line(PROMPT)? else {
                break;
            };

            let flow = match ShellCommand::parse(&line) {
                Ok(command) => match self.handle(command, input).await {
                    Ok(flow) => flow,
                    Err(e) => {
                        self.report(&e)?;
                        Flow::Continue
                    }
                },
                Err(e) => {
                    self.report(&e)?;
                    Flow::Continue
                }
            };

            if flow == Flow::Exit {
                break;
            }
        }

        writeln!(self.out, "Bye!")?;
        Ok(())
    }

    /// Runs one command.
    pub async fn handle(&mut self, command: ShellCommand, input: &mut dyn LineSource) -> Result<Flow> {
        debug!(?command, "handling");

        match command {
            ShellCommand::Empty => {}
            ShellCommand::Exit => return Ok(Flow::Exit),
            ShellCommand::Help => writeln!(self.out, "{HELP}")?,
            ShellCommand::Login => {
                self.dispatcher.login(&self.options).await?;
                writeln!(self.out, "Login successful")?;
            }
            ShellCommand::Session => {
                let session = self.dispatcher.session(&self.options).await?;
                writeln!(self.out, "{}", session.token)?;
            }
            ShellCommand::GetConf => self.print_json(&self.options.clone())?,
            ShellCommand::SetVault(vault) => self.set_vault(&vault)?,
            ShellCommand::SetDebug(raw) => self.set_debug(&raw)?,
            ShellCommand::Version => self.run_plain(&["--version"]).await?,
            ShellCommand::Update => self.run_plain(&["update"]).await?,
            ShellCommand::List => {
                let items = self.items(false).await?.to_vec();
                self.print_json(&items)?;
            }
            ShellCommand::Refresh => {
                let count = self.items(true).await?.len();
                writeln!(self.out, "{count} items loaded")?;
            }
            ShellCommand::Get(reference) => {
                validate_argument("item", &reference)?;
                self.print_item(&reference).await?;
            }
            ShellCommand::Search(query) => self.search(&query, input).await?,
            ShellCommand::Op(args) => self.passthrough(args).await?,
        }

        Ok(Flow::Continue)
    }

    fn set_vault(&mut self, vault: &str) -> Result<()> {
        let next = self.options.with_vault(vault);
        if let Some(ref name) = next.vault {
            validate_argument("vault", name)?;
        }
        if next.vault != self.options.vault {
            self.items.clear();
        }
        self.options = next;
        match self.options.vault {
            Some(ref name) => writeln!(self.out, "Vault set to {name}")?,
            None => writeln!(self.out, "Vault restriction cleared")?,
        }
        Ok(())
    }

    fn set_debug(&mut self, raw: &str) -> Result<()> {
        let Some(debug) = parse_debug_toggle(raw) else {
            debug!(value = raw, "ignoring unrecognized setdebug value");
            return Ok(());
        };
        self.options = self.options.with_debug(debug);
        if let Some(ref log) = self.log {
            log.set_debug(debug)?;
        }
        Ok(())
    }

    async fn items(&mut self, refresh: bool) -> Result<&[Value]> {
        if !refresh && self.items.is_empty() {
            if let Some(cached) = self.read_item_cache().await? {
                self.items = cached;
            }
        }

        if refresh || self.items.is_empty() {
            self.items = self.dispatcher.list_items(&self.options).await?;
            debug!(count = self.items.len(), "item list loaded");
            self.write_item_cache().await?;
        }
        Ok(&self.items)
    }

    fn item_cache(&self) -> Option<ItemCache> {
        let base = self.options.item_cache.as_deref()?;
        Some(ItemCache::new(base, self.options.vault.as_deref()))
    }

    async fn read_item_cache(&self) -> Result<Option<Vec<Value>>> {
        let Some(cache) = self.item_cache() else {
            return Ok(None);
        };
        let session = self.dispatcher.session(&self.options).await?;
        Ok(cache.load(&session.token).await)
    }

    async fn write_item_cache(&self) -> Result<()> {
        let Some(cache) = self.item_cache() else {
            return Ok(());
        };
        let session = self.dispatcher.session(&self.options).await?;
        if let Err(e) = cache.save(&session.token, &self.items).await {
            warn!(path = %cache.path().display(), error = %e, "item cache not written");
        }
        Ok(())
    }

    async fn print_item(&mut self, reference: &str) -> Result<()> {
        let raw = self.dispatcher.get_item(&self.options, reference).await?;
        match ItemSummary::from_json(&raw) {
            Some(summary) => self.print_json(&summary),
            None => self.print_json(&raw),
        }
    }

    async fn search(&mut self, query: &str, input: &mut dyn LineSource) -> Result<()> {
        if query.trim().is_empty() {
            writeln!(self.out, "A query is required")?;
            return Ok(());
        }
        let query = Query::parse(query)?;

        let items = self.items(false).await?;
        let found: Vec<(String, String)> = query
            .filter(items)
            .into_iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?.to_string();
                Some((id, choice_label(item)))
            })
            .collect();

        let id = match found.len() {
            0 => {
                writeln!(self.out, "No item found")?;
                return Ok(());
            }
            1 => found[0].0.clone(),
            _ => {
                let labels: Vec<&str> = found.iter().map(|(_, label)| label.as_str()).collect();
                match self.choose(&labels, input)? {
                    Some(index) => found[index].0.clone(),
                    None => return Ok(()),
                }
            }
        };

        self.print_item(&id).await
    }

    fn choose(&mut self, labels: &[&str], input: &mut dyn LineSource) -> Result<Option<usize>> {
        for (index, label) in labels.iter().enumerate() {
            writeln!(self.out, "{index}: {label}")?;
        }
        loop {
            let Some(answer) = input.read_line("Enter one of the choices above: ")? else {
                return Ok(None);
            };
            match parse_choice(&answer, labels.len()) {
                Choice::Index(index) => return Ok(Some(index)),
                Choice::Abort => return Ok(None),
                Choice::Invalid => continue,
            }
        }
    }

    async fn run_plain(&mut self, args: &[&str]) -> Result<()> {
        let output = self
            .dispatcher
            .op()
            .run_unauthenticated(&self.options, args)
            .await?;
        self.write_stdout(&output.stdout)
    }

    async fn passthrough(&mut self, args: Vec<String>) -> Result<()> {
        match self
            .dispatcher
            .execute(&self.options, &OpCall::Passthrough(args))
            .await
        {
            Ok(output) => self.write_stdout(&output.stdout),
            Err(OppyError::Subprocess { program, code, .. }) => {
                writeln!(self.out, "{program} exited with code {code}")?;
                Ok(())
            }
            Err(OppyError::Interrupted) => {
                writeln!(self.out, "interrupted")?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn write_stdout(&mut self, stdout: &str) -> Result<()> {
        if !stdout.is_empty() {
            write!(self.out, "{stdout}")?;
            if !stdout.ends_with('\n') {
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(self.out, "{json}")?;
        Ok(())
    }

    fn report(&mut self, error: &OppyError) -> Result<()> {
        writeln!(self.out, "error: {error}")?;
        if let OppyError::Subprocess { stderr, .. } = error {
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                writeln!(self.out, "{stderr}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtins() {
        assert_eq!(ShellCommand::parse("  ").unwrap(), ShellCommand::Empty);
        assert_eq!(ShellCommand::parse("login").unwrap(), ShellCommand::Login);
        assert_eq!(
            ShellCommand::parse("setvault  Shared Team ").unwrap(),
            ShellCommand::SetVault("Shared Team".to_string())
        );
        assert_eq!(
            ShellCommand::parse("search title=\"Git*\" | bank").unwrap(),
            ShellCommand::Search("title=\"Git*\" | bank".to_string())
        );
        assert_eq!(ShellCommand::parse("quit").unwrap(), ShellCommand::Exit);
        assert_eq!(ShellCommand::parse("?").unwrap(), ShellCommand::Help);
    }

    #[test]
    fn test_parse_passthrough() {
        assert_eq!(
            ShellCommand::parse("item get 'My Bank' --fields password").unwrap(),
            ShellCommand::Op(vec![
                "item".into(),
                "get".into(),
                "My Bank".into(),
                "--fields".into(),
                "password".into()
            ])
        );
        assert_eq!(
            ShellCommand::parse("op whoami").unwrap(),
            ShellCommand::Op(vec!["whoami".into()])
        );
        assert!(ShellCommand::parse("item get \"unbalanced").is_err());
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1", 3), Choice::Index(1));
        assert_eq!(parse_choice(" 0 ", 1), Choice::Index(0));
        assert_eq!(parse_choice("3", 3), Choice::Invalid);
        assert_eq!(parse_choice("abc", 3), Choice::Invalid);
        assert_eq!(parse_choice("q", 3), Choice::Abort);
        assert_eq!(parse_choice("exit", 3), Choice::Abort);
    }

    #[test]
    fn test_parse_debug_toggle() {
        assert_eq!(parse_debug_toggle("Y"), Some(true));
        assert_eq!(parse_debug_toggle("yes"), Some(true));
        assert_eq!(parse_debug_toggle("f"), Some(false));
        assert_eq!(parse_debug_toggle("0"), Some(false));
        assert_eq!(parse_debug_toggle("sometimes"), None);
    }

    #[test]
    fn test_completer_matches_first_word_only() {
        let completer = CommandCompleter::new(COMMAND_NAMES);
        assert_eq!(completer.complete_token("set"), vec!["setdebug", "setvault"]);
        assert_eq!(completer.complete_token("ref"), vec!["refresh"]);
        assert!(completer.complete_token("zzz").is_empty());
    }
}
