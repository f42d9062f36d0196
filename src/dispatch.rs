//! Runs `op` calls with a cached session, re-authenticating once on
//! rejection.

use crate::cli::{CommandOutput, CommandRunner, PasswordPrompt};
use crate::config::EffectiveOptions;
use crate::op::{parse_item_list, OpCall, OpClient};
use crate::session::{CachedSession, SessionCache};
use crate::{OppyError, Result, SecretStore};
use serde_json::Value;
use tracing::warn;

/// Owns everything needed to talk to `op` on behalf of the shell.
pub struct Dispatcher<S, R, P> {
    op: OpClient<R>,
    cache: SessionCache<S>,
    prompt: P,
}

impl<S, R, P> Dispatcher<S, R, P>
where
    S: SecretStore,
    R: CommandRunner,
    P: PasswordPrompt,
{
    pub fn new(store: S, runner: R, prompt: P) -> Self {
        Self {
            op: OpClient::new(runner),
            cache: SessionCache::new(store),
            prompt,
        }
    }

    pub fn op(&self) -> &OpClient<R> {
        &self.op
    }

    pub fn cache(&self) -> &SessionCache<S> {
        &self.cache
    }

    /// Cached session for the domain, signing in on a miss.
    pub async fn session(&self, options: &EffectiveOptions) -> Result<CachedSession> {
        self.cache.acquire(options, &self.op, &self.prompt).await
    }

    /// Forces a fresh sign-in.
    pub async fn login(&self, options: &EffectiveOptions) -> Result<CachedSession> {
        self.cache.invalidate(&options.domain).await?;
        self.cache.sign_in(options, &self.op, &self.prompt).await
    }

    /// Runs `call` with the domain's session.
    ///
    /// If `op` rejects the session, the cached entry is dropped, a fresh
    /// sign-in is made and the call is retried exactly once. A second
    /// rejection drops the entry again and is returned as
    /// [`OppyError::Auth`].
    pub async fn execute(&self, options: &EffectiveOptions, call: &OpCall) -> Result<CommandOutput> {
        let domain = options.domain.as_str();
        let session = self.session(options).await?;

        match self.op.call(options, &session.token, call).await {
            Err(OppyError::Auth(reason)) => {
                warn!(domain, %reason, "session rejected, signing in again");
                self.cache.invalidate(domain).await?;
                let session = self.cache.sign_in(options, &self.op, &self.prompt).await?;

                match self.op.call(options, &session.token, call).await {
                    Err(e) if e.is_auth() => {
                        self.cache.invalidate(domain).await?;
                        Err(e)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Fetches the item list for the current vault.
    pub async fn list_items(&self, options: &EffectiveOptions) -> Result<Vec<Value>> {
        let output = self.execute(options, &OpCall::ListItems).await?;
        parse_item_list(&output.stdout)
    }

    /// Fetches one item by ID or title.
    pub async fn get_item(&self, options: &EffectiveOptions, reference: &str) -> Result<Value> {
        let output = self
            .execute(options, &OpCall::GetItem(reference.to_string()))
            .await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::config::{Overrides, ProfileSet};
    use crate::mock::{FixedPassword, ScriptedRunner};
    use crate::stores::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn options() -> EffectiveOptions {
        let set = ProfileSet::parse("[p]\ndomain = acme\n", "c.ini").unwrap();
        EffectiveOptions::merge(set.profile("p").unwrap(), &Overrides::default(), "c.ini")
    }

    #[tokio::test]
    async fn test_get_item_parses_json() {
        let runner = ScriptedRunner::new(|inv| {
            if inv.args[0] == "signin" {
                return Ok(CommandOutput::ok("tok\n"));
            }
            assert_eq!(inv.env_value("OP_SESSION_acme"), Some("tok"));
            Ok(CommandOutput::ok(r#"{"id":"x1","title":"Bank"}"#))
        });
        let dispatcher = Dispatcher::new(MemoryStore::new(), runner, FixedPassword::new("pw"));

        let item = dispatcher.get_item(&options(), "Bank").await.unwrap();
        assert_eq!(item["id"], "x1");
    }

    #[tokio::test]
    async fn test_subprocess_error_does_not_retry() {
        let signins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signins);
        let runner = ScriptedRunner::new(move |inv| {
            if inv.args[0] == "signin" {
                counter.fetch_add(1, Ordering::SeqCst);
                return Ok(CommandOutput::ok("tok"));
            }
            Ok(CommandOutput::failed(1, "\"nope\" isn't an item"))
        });
        let dispatcher = Dispatcher::new(MemoryStore::new(), runner, FixedPassword::new("pw"));

        let result = dispatcher.get_item(&options(), "nope").await;
        assert!(matches!(result, Err(OppyError::Subprocess { code: 1, .. })));
        assert_eq!(signins.load(Ordering::SeqCst), 1);
        assert!(dispatcher.cache().lookup("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_item_named_like_auth_error_keeps_session() {
        let signins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signins);
        let runner = ScriptedRunner::new(move |inv| {
            if inv.args[0] == "signin" {
                counter.fetch_add(1, Ordering::SeqCst);
                return Ok(CommandOutput::ok("tok"));
            }
            Ok(CommandOutput::failed(
                1,
                "[ERROR] 2024/01/31 09:15:02 \"Unauthorized Access log\" isn't an item.",
            ))
        });
        let prompt = FixedPassword::new("pw");
        let dispatcher = Dispatcher::new(MemoryStore::new(), runner, prompt.clone());

        let result = dispatcher.get_item(&options(), "Unauthorized Access log").await;

        assert!(matches!(result, Err(OppyError::Subprocess { code: 1, .. })));
        assert_eq!(signins.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.times_asked(), 1);
        assert_eq!(
            dispatcher.cache().lookup("acme").await.unwrap().unwrap().token,
            "tok"
        );
    }

    #[tokio::test]
    async fn test_login_replaces_cached_token() {
        let signins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signins);
        let runner = ScriptedRunner::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CommandOutput::ok(format!("tok-{n}")))
        });
        let dispatcher = Dispatcher::new(MemoryStore::new(), runner, FixedPassword::new("pw"));

        assert_eq!(dispatcher.session(&options()).await.unwrap().token, "tok-1");
        assert_eq!(dispatcher.session(&options()).await.unwrap().token, "tok-1");
        assert_eq!(dispatcher.login(&options()).await.unwrap().token, "tok-2");
        assert_eq!(dispatcher.session(&options()).await.unwrap().token, "tok-2");
    }
}
