//! Session token caching in the OS secret store.
//!
//! A domain's session moves through `Absent → Valid → Expired → Absent`.
//! Expiry is only observed lazily: [`SessionCache::lookup`] deletes a stale
//! entry when it finds one. Nothing scans or evicts in the background.

use crate::cli::{CommandRunner, PasswordPrompt};
use crate::config::EffectiveOptions;
use crate::op::{OpClient, SignIn};
use crate::{OppyError, Result, SecretStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Password prompts allowed for one sign-in before giving up.
pub const MAX_SIGNIN_ATTEMPTS: usize = 3;

/// Key a domain's session is stored under.
pub fn session_key(domain: &str) -> String {
    crate::op::session_env_var(domain)
}

/// Session data stored in the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    /// The session token
    pub token: String,
    /// When this session was created
    pub created: DateTime<Utc>,
    /// When this session expires
    pub expires: DateTime<Utc>,
    /// Domain the token unlocks
    pub domain: String,
}

impl CachedSession {
    /// Returns true once `expires` has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires
    }
}

/// Session cache handles persistence of session tokens in a [`SecretStore`].
///
/// # Security
///
/// - Tokens are never logged or included in errors
/// - Invalid or expired entries are deleted as soon as they are read
///
/// # Example
///
/// ```
/// use oppy::session::SessionCache;
/// use oppy::stores::memory::MemoryStore;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> oppy::Result<()> {
///     let cache = SessionCache::new(MemoryStore::new());
///
///     cache.store("acme", "token", Duration::from_secs(1800), None).await?;
///     let cached = cache.lookup("acme").await?.unwrap();
///     assert_eq!(cached.token, "token");
///
///     cache.invalidate("acme").await?;
///     assert!(cache.lookup("acme").await?.is_none());
///     Ok(())
/// }
/// ```
pub struct SessionCache<S> {
    store: S,
}

impl<S: SecretStore> SessionCache<S> {
    /// Creates a cache writing through `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads the session for `domain`.
    ///
    /// Returns `Ok(None)` if:
    /// - No entry exists
    /// - The entry is expired
    /// - The entry is not valid JSON
    ///
    /// Expired and invalid entries are deleted.
    pub async fn lookup(&self, domain: &str) -> Result<Option<CachedSession>> {
        let key = session_key(domain);
        let Some(raw) = self.store.get(&key).await? else {
            debug!(domain, store = self.store.name(), "no cached session");
            return Ok(None);
        };

        let session: CachedSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(domain, error = %e, "discarding unreadable cached session");
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };

        if session.is_expired() {
            debug!(domain, expired_at = %session.expires, "cached session expired");
            self.store.delete(&key).await?;
            return Ok(None);
        }

        debug!(domain, expires = %session.expires, "using cached session");
        Ok(Some(session))
    }

    /// Stores `token` for `domain`.
    ///
    /// The expiry is `stated_expiry` when `op` reported one, otherwise now
    /// plus `ttl`.
    pub async fn store(
        &self,
        domain: &str,
        token: impl Into<String>,
        ttl: std::time::Duration,
        stated_expiry: Option<DateTime<Utc>>,
    ) -> Result<CachedSession> {
        let now = Utc::now();
        let expires = match stated_expiry {
            Some(expires) => expires,
            None => Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| {
                    OppyError::InvalidArgument(format!(
                        "session lifetime of {}s is out of range",
                        ttl.as_secs()
                    ))
                })?,
        };

        let session = CachedSession {
            token: token.into(),
            created: now,
            expires,
            domain: domain.to_string(),
        };

        let json = serde_json::to_string(&session)?;
        self.store.set(&session_key(domain), &json).await?;
        debug!(domain, store = self.store.name(), expires = %session.expires, "session cached");
        Ok(session)
    }

    /// Deletes the session for `domain`.
    ///
    /// This is idempotent.
    pub async fn invalidate(&self, domain: &str) -> Result<()> {
        debug!(domain, "invalidating cached session");
        self.store.delete(&session_key(domain)).await
    }

    /// Returns a usable session, signing in only on a cache miss.
    pub async fn acquire<R: CommandRunner>(
        &self,
        options: &EffectiveOptions,
        op: &OpClient<R>,
        prompt: &dyn PasswordPrompt,
    ) -> Result<CachedSession> {
        if let Some(session) = self.lookup(&options.domain).await? {
            return Ok(session);
        }
        self.sign_in(options, op, prompt).await
    }

    /// Signs in unconditionally and replaces the cached session.
    ///
    /// The password is asked for up to [`MAX_SIGNIN_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns [`OppyError::Auth`] with the last refusal when every attempt
    /// fails. Other errors (missing binary, store failure) end the loop
    /// immediately.
    pub async fn sign_in<R: CommandRunner>(
        &self,
        options: &EffectiveOptions,
        op: &OpClient<R>,
        prompt: &dyn PasswordPrompt,
    ) -> Result<CachedSession> {
        let domain = options.domain.as_str();
        let mut last_error = None;

        for attempt in 1..=MAX_SIGNIN_ATTEMPTS {
            let password = prompt.read_password(&format!("1Password master password for {domain}: "))?;

            match op.signin(options, &password).await {
                Ok(SignIn { token, expires_at }) => {
                    let session = self
                        .store(domain, token, options.session_ttl, expires_at)
                        .await?;
                    info!(domain, "signed in");
                    return Ok(session);
                }
                Err(OppyError::Auth(reason)) => {
                    warn!(domain, attempt, %reason, "sign-in failed");
                    last_error = Some(reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(OppyError::Auth(last_error.unwrap_or_else(|| {
            format!("could not sign in to {domain}")
        })))
    }
}
