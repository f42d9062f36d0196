//! Runs the dispatcher against a shell script standing in for `op`.
//!
//! Run with:
//!   cargo test --test fake_op_process

#![cfg(all(unix, feature = "mock"))]

use oppy::cli::ProcessRunner;
use oppy::mock::FixedPassword;
use oppy::op::OpCall;
use oppy::stores::memory::MemoryStore;
use oppy::{Dispatcher, EffectiveOptions, OppyError, Overrides, ProfileSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

const FAKE_OP: &str = r#"#!/bin/sh
case "$1" in
  signin)
    read -r pw
    if [ "$pw" = "pw" ]; then
      echo "tok-123"
    else
      echo "[ERROR] 401: Unauthorized" >&2
      exit 1
    fi
    ;;
  item)
    if [ "$OP_SESSION_acme" != "tok-123" ]; then
      echo "[ERROR] You are not currently signed in." >&2
      exit 1
    fi
    if [ "$2" = "list" ]; then
      echo '[{"id":"a1","title":"GitHub"},{"id":"b1","title":"Bank"}]'
    else
      echo "{\"id\":\"$3\",\"title\":\"GitHub\"}"
    fi
    ;;
  whoami)
    echo "[ERROR] account not found" >&2
    exit 3
    ;;
  *)
    exit 0
    ;;
esac
"#;

fn install_fake_op(dir: &Path) -> String {
    let path = dir.join("op");
    fs::write(&path, FAKE_OP).expect("Failed to write fake op");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake op executable");
    path.to_string_lossy().into_owned()
}

fn options(op_path: &str) -> EffectiveOptions {
    let profiles = ProfileSet::parse("[work]\ndomain = acme\n", "config.ini").unwrap();
    EffectiveOptions::merge(
        profiles.profile("work").unwrap(),
        &Overrides::default().with_op_path(op_path),
        "config.ini",
    )
}

#[tokio::test]
async fn test_signin_and_list_through_process() {
    let dir = TempDir::new().unwrap();
    let options = options(&install_fake_op(dir.path()));
    let store = MemoryStore::new();
    let prompt = FixedPassword::new("pw");
    let dispatcher = Dispatcher::new(store.handle(), ProcessRunner, prompt.clone());

    let items = dispatcher.list_items(&options).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["title"], "Bank");

    let item = dispatcher.get_item(&options, "a1").await.unwrap();
    assert_eq!(item["id"], "a1");
    assert_eq!(prompt.times_asked(), 1);

    // A second shell on the same keyring reuses the token.
    let again = FixedPassword::new("pw");
    let second = Dispatcher::new(store.handle(), ProcessRunner, again.clone());
    assert_eq!(second.session(&options).await.unwrap().token, "tok-123");
    assert_eq!(again.times_asked(), 0);
}

#[tokio::test]
async fn test_wrong_password_gives_up_after_three_attempts() {
    let dir = TempDir::new().unwrap();
    let options = options(&install_fake_op(dir.path()));
    let store = MemoryStore::new();
    let prompt = FixedPassword::new("wrong");
    let dispatcher = Dispatcher::new(store.handle(), ProcessRunner, prompt.clone());

    let result = dispatcher.session(&options).await;
    assert!(matches!(result, Err(OppyError::Auth(_))));
    assert_eq!(prompt.times_asked(), 3);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_passthrough_failure_reports_exit_code_and_stderr() {
    let dir = TempDir::new().unwrap();
    let options = options(&install_fake_op(dir.path()));
    let dispatcher = Dispatcher::new(MemoryStore::new(), ProcessRunner, FixedPassword::new("pw"));

    let result = dispatcher
        .execute(&options, &OpCall::Passthrough(vec!["whoami".to_string()]))
        .await;

    match result {
        Err(OppyError::Subprocess { code, stderr, .. }) => {
            assert_eq!(code, 3);
            assert!(stderr.contains("account not found"));
        }
        other => panic!("expected subprocess error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_binary_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no-such-op");
    let options = options(&missing.to_string_lossy());
    let dispatcher = Dispatcher::new(MemoryStore::new(), ProcessRunner, FixedPassword::new("pw"));

    let result = dispatcher.session(&options).await;
    assert!(matches!(result, Err(OppyError::NotInstalled(_))));
}
