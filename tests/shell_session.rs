//! End-to-end shell and session tests against a scripted `op`.
//!
//! Run with:
//!   cargo test --test shell_session

#![cfg(feature = "mock")]

use chrono::{Duration, Utc};
use oppy::cli::{CommandOutput, Invocation};
use oppy::mock::{FixedPassword, ScriptedInput, ScriptedRunner, SharedBuffer};
use oppy::session::session_key;
use oppy::shell::Shell;
use oppy::stores::memory::MemoryStore;
use oppy::{config, ConfigError, Dispatcher, EffectiveOptions, OppyError, Overrides, SecretStore};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

const CONFIG: &str = "\
[DEFAULT]
debug = no

[p1]
domain = acme
vault = Private

[p2]
domain = example
vault = null
debug = yes
session_ttl = 5
";

fn write_config() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    file.write_all(CONFIG.as_bytes()).expect("Failed to write config");
    file
}

fn options(profile: &str) -> EffectiveOptions {
    let file = write_config();
    config::resolve(file.path(), profile, &Overrides::default()).expect("Failed to resolve profile")
}

fn items() -> serde_json::Value {
    json!([
        {"id": "a1", "title": "GitHub", "urls": [{"href": "https://github.com", "primary": true}]},
        {"id": "a2", "title": "GitLab"},
        {"id": "b1", "title": "Bank"}
    ])
}

fn item_detail(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("item {id}"),
        "fields": [
            {"id": "username", "purpose": "USERNAME", "value": format!("user-{id}")},
            {"id": "password", "purpose": "PASSWORD", "value": format!("secret-{id}")}
        ]
    })
}

/// `op` that accepts any password and serves a fixed vault.
fn fake_op(inv: &Invocation) -> oppy::Result<CommandOutput> {
    match (inv.args.first().map(String::as_str), inv.args.get(1).map(String::as_str)) {
        (Some("signin"), _) => Ok(CommandOutput::ok("tok\n")),
        (Some("item"), Some("list")) => Ok(CommandOutput::ok(items().to_string())),
        (Some("item"), Some("get")) => Ok(CommandOutput::ok(item_detail(&inv.args[2]).to_string())),
        (Some("whoami"), _) => Ok(CommandOutput::ok("me@acme\n")),
        (Some("explode"), _) => Ok(CommandOutput::failed(2, "[ERROR] unknown command")),
        _ => Ok(CommandOutput::failed(1, "unexpected")),
    }
}

#[test]
fn test_profiles_resolve_with_defaults_and_overrides() {
    let file = write_config();

    let p1 = config::resolve(file.path(), "p1", &Overrides::default()).unwrap();
    assert_eq!(p1.domain, "acme");
    assert_eq!(p1.vault.as_deref(), Some("Private"));
    assert!(!p1.debug);

    let p2 = config::resolve(file.path(), "p2", &Overrides::default()).unwrap();
    assert_eq!(p2.vault, None);
    assert!(p2.debug);
    assert_eq!(p2.session_ttl, std::time::Duration::from_secs(5 * 60));

    let overridden = config::resolve(
        file.path(),
        "p1",
        &Overrides::default().with_vault("Shared").with_debug(true),
    )
    .unwrap();
    assert_eq!(overridden.vault.as_deref(), Some("Shared"));
    assert!(overridden.debug);

    let missing = config::resolve(file.path(), "p3", &Overrides::default());
    assert!(matches!(missing, Err(ConfigError::UnknownProfile { .. })));
}

#[tokio::test]
async fn test_expired_session_triggers_new_signin() {
    let store = MemoryStore::new();
    let stale = json!({
        "token": "old",
        "created": (Utc::now() - Duration::hours(2)).to_rfc3339(),
        "expires": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        "domain": "acme"
    });
    store.set(&session_key("acme"), &stale.to_string()).await.unwrap();

    let runner = ScriptedRunner::new(fake_op);
    let prompt = FixedPassword::new("pw");
    let dispatcher = Dispatcher::new(store.handle(), runner.clone(), prompt.clone());

    let session = dispatcher.session(&options("p1")).await.unwrap();
    assert_eq!(session.token, "tok");
    assert_eq!(runner.count("signin"), 1);
    assert_eq!(prompt.times_asked(), 1);
}

#[tokio::test]
async fn test_rejected_session_is_retried_once() {
    let signins = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&signins);
    let runner = ScriptedRunner::new(move |inv| {
        if inv.args[0] == "signin" {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(CommandOutput::ok(format!("tok-{n}")));
        }
        Ok(CommandOutput::failed(1, "[ERROR] You are not currently signed in."))
    });
    let store = MemoryStore::new();
    let dispatcher = Dispatcher::new(store.handle(), runner.clone(), FixedPassword::new("pw"));

    let result = dispatcher.list_items(&options("p1")).await;

    assert!(matches!(result, Err(OppyError::Auth(_))));
    assert_eq!(signins.load(Ordering::SeqCst), 2);
    assert_eq!(runner.count("item"), 2);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_shell_search_get_and_passthrough() {
    let runner = ScriptedRunner::new(fake_op);
    let dispatcher = Dispatcher::new(MemoryStore::new(), runner.clone(), FixedPassword::new("pw"));
    let out = SharedBuffer::new();
    let mut shell = Shell::new(options("p1"), dispatcher, Box::new(out.clone()));

    let mut input = ScriptedInput::new([
        "search title=\"Git*\"",
        "7",
        "1",
        "search bank",
        "search nothing",
        "whoami",
        "explode",
        "bye",
        "never read",
    ]);

    shell.start().await.unwrap();
    shell.run(&mut input).await.unwrap();

    let text = out.contents();
    assert!(text.contains("Welcome"));
    assert!(text.contains("0: GitHub :: https://github.com"));
    assert!(text.contains("1: GitLab :: -"));
    assert!(text.contains("secret-a2"));
    assert!(text.contains("secret-b1"));
    assert!(text.contains("No item found"));
    assert!(text.contains("me@acme"));
    assert!(text.contains("op exited with code 2"));
    assert!(text.trim_end().ends_with("Bye!"));

    assert_eq!(runner.count("signin"), 1);
    assert_eq!(runner.count("item"), 3);
    assert!(input
        .prompts()
        .iter()
        .any(|p| p.starts_with("Enter one of the choices")));

    let list = runner
        .calls()
        .into_iter()
        .find(|inv| inv.args.get(1).map(String::as_str) == Some("list"))
        .unwrap();
    assert!(list.args.windows(2).any(|w| w == ["--vault", "Private"]));
    assert!(list.args.windows(2).any(|w| w == ["--account", "acme"]));
}

#[tokio::test]
async fn test_shell_setvault_and_getconf() {
    let runner = ScriptedRunner::new(fake_op);
    let dispatcher = Dispatcher::new(MemoryStore::new(), runner.clone(), FixedPassword::new("pw"));
    let out = SharedBuffer::new();
    let mut shell = Shell::new(options("p1"), dispatcher, Box::new(out.clone()));

    let mut input = ScriptedInput::new([
        "list",
        "setvault Shared",
        "list",
        "setdebug maybe",
        "setdebug yes",
        "getconf",
        "search (",
    ]);
    shell.run(&mut input).await.unwrap();

    assert_eq!(shell.options().vault.as_deref(), Some("Shared"));
    assert!(shell.options().debug);
    assert_eq!(runner.count("item"), 2);

    let text = out.contents();
    assert!(text.contains("Vault set to Shared"));
    assert!(text.contains("\"domain\": \"acme\""));
    assert!(text.contains("\"session_ttl_minutes\": 30"));
    assert!(text.contains("error: "));
    assert!(text.trim_end().ends_with("Bye!"));

    let vaults: Vec<String> = runner
        .calls()
        .into_iter()
        .filter(|inv| inv.args.get(1).map(String::as_str) == Some("list"))
        .filter_map(|inv| {
            let pos = inv.args.iter().position(|a| a == "--vault")?;
            inv.args.get(pos + 1).cloned()
        })
        .collect();
    assert_eq!(vaults, vec!["Private", "Shared"]);
}

#[tokio::test]
async fn test_item_cache_reused_per_vault_and_session() {
    let dir = TempDir::new().unwrap();
    let options = EffectiveOptions {
        item_cache: Some(dir.path().join("items")),
        ..options("p1")
    };
    let store = MemoryStore::new();

    let first = ScriptedRunner::new(fake_op);
    let dispatcher = Dispatcher::new(store.handle(), first.clone(), FixedPassword::new("pw"));
    let mut shell = Shell::new(options.clone(), dispatcher, Box::new(SharedBuffer::new()));
    shell.run(&mut ScriptedInput::new(["list"])).await.unwrap();
    assert_eq!(first.count("item"), 1);
    assert!(dir.path().join("items-Private").exists());

    // Same session: the list comes from disk until the vault changes.
    let second = ScriptedRunner::new(fake_op);
    let out = SharedBuffer::new();
    let dispatcher = Dispatcher::new(store.handle(), second.clone(), FixedPassword::new("pw"));
    let mut shell = Shell::new(options.clone(), dispatcher, Box::new(out.clone()));
    shell
        .run(&mut ScriptedInput::new(["list", "setvault Shared", "list"]))
        .await
        .unwrap();
    assert_eq!(second.count("signin"), 0);
    assert_eq!(second.count("item"), 1);
    assert!(out.contents().contains("GitHub"));
    assert!(dir.path().join("items-Shared").exists());

    // A new session cannot open the old file and fetches again.
    let third = ScriptedRunner::new(|inv| {
        if inv.args[0] == "signin" {
            return Ok(CommandOutput::ok("tok-2\n"));
        }
        fake_op(inv)
    });
    let dispatcher = Dispatcher::new(MemoryStore::new(), third.clone(), FixedPassword::new("pw"));
    let mut shell = Shell::new(options, dispatcher, Box::new(SharedBuffer::new()));
    shell.run(&mut ScriptedInput::new(["list", "refresh"])).await.unwrap();
    assert_eq!(third.count("signin"), 1);
    assert_eq!(third.count("item"), 2);
    assert!(dir.path().join("items-Private").exists());
}
