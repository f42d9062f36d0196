//! In-memory secret store for testing.
//!
//! Stores entries in a map with support for error injection to simulate an
//! unavailable keyring.

use crate::{OppyError, Result, SecretStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory secret store.
///
/// Clones share the same entries, so a test can keep a handle while the
/// session cache owns another.
///
/// # Example
///
/// ```
/// use oppy::stores::memory::MemoryStore;
/// use oppy::{OppyError, SecretStore};
///
/// #[tokio::main]
/// async fn main() -> oppy::Result<()> {
///     let mut store = MemoryStore::new();
///     store.set("OP_SESSION_acme", "{}").await?;
///     assert!(store.get("OP_SESSION_acme").await?.is_some());
///
///     store.get_error = Some(OppyError::Store("locked".to_string()));
///     assert!(store.get("OP_SESSION_acme").await.is_err());
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,

    /// Error to return from `get()`
    pub get_error: Option<OppyError>,
    /// Error to return from `set()`
    pub set_error: Option<OppyError>,
    /// Error to return from `delete()`
    pub delete_error: Option<OppyError>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a store sharing this one's entries, without injected errors.
    pub fn handle(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ..Self::default()
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(ref err) = self.get_error {
            return Err(OppyError::Store(err.to_string()));
        }
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(ref err) = self.set_error {
            return Err(OppyError::Store(err.to_string()));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(ref err) = self.delete_error {
            return Err(OppyError::Store(err.to_string()));
        }
        self.entries.write().await.remove(key);
        Ok(())
    }
}
