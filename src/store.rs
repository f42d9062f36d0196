//! Secret store trait for session persistence.
//!
//! This module defines the [`SecretStore`] trait the session cache writes
//! through. The store is an opaque key/value service: it encrypts and
//! authenticates on its own, and callers never lock around it.

use crate::Result;
use async_trait::async_trait;

/// SecretStore represents an OS secret storage service.
///
/// All implementations must be `Send + Sync`.
///
/// # Implementations
///
/// - **OS-native**: [`KeyringStore`](crate::stores::os_keyring::KeyringStore)
///   (macOS Keychain, Windows Credential Manager, Secret Service)
/// - **Testing**: [`MemoryStore`](crate::stores::memory::MemoryStore) with
///   error injection
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the store name (e.g., "keyring", "memory").
    fn name(&self) -> &str;

    /// Reads the secret stored under `key`.
    ///
    /// Returns `Ok(None)` when no entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`OppyError::Store`](crate::OppyError::Store) if the service
    /// is unavailable or refuses access.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the entry under `key`.
    ///
    /// This is idempotent: deleting a missing entry is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
