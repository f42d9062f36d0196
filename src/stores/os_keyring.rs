//! OS keyring store.
//!
//! Backed by the platform secret service through the `keyring` crate:
//! macOS Keychain, Windows Credential Manager, or the freedesktop Secret
//! Service on Linux. Calls are synchronous and short, so they run inline on
//! the shell's single thread.

use crate::{OppyError, Result, SecretStore};
use async_trait::async_trait;

/// Service name every entry is filed under.
pub const DEFAULT_SERVICE: &str = "oppy";

/// Secret store backed by the OS keyring.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Creates a store using [`DEFAULT_SERVICE`].
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    /// Creates a store filing entries under a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| OppyError::Store(format!("keyring error: {e}")))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    fn name(&self) -> &str {
        "keyring"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(OppyError::Store(format!("failed to read from keyring: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| OppyError::Store(format!("failed to store in keyring: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(OppyError::Store(format!("failed to delete from keyring: {e}"))),
        }
    }
}
