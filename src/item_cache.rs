//! Encrypted on-disk copy of the item list.
//!
//! Enabled per profile with `temp_file`. Each vault gets its own file
//! (`<temp_file>-<vault>`). Contents are sealed with AES-256-GCM under a key
//! derived from the session token, so a file written under an older session
//! fails to open; it is then deleted and the list is fetched again.

use crate::{OppyError, Result};
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const NONCE_BYTES: usize = 12;
const AAD: &[u8] = b"oppy-item-cache";
const FORMAT_PREFIX: &str = "oppy1:";

/// Item-list cache file for one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCache {
    path: PathBuf,
}

impl ItemCache {
    /// Cache for `vault` under the profile's `temp_file` base path.
    pub fn new(base: &Path, vault: Option<&str>) -> Self {
        let path = match vault {
            Some(vault) => {
                let mut name = base.as_os_str().to_os_string();
                name.push("-");
                name.push(file_safe(vault));
                PathBuf::from(name)
            }
            None => base.to_path_buf(),
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached items.
    ///
    /// Returns `None` when there is no file. A file that cannot be read,
    /// decrypted or parsed is deleted and also yields `None`.
    pub async fn load(&self, token: &str) -> Option<Vec<Value>> {
        let payload = match tokio::fs::read_to_string(&self.path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "item cache unreadable");
                self.discard().await;
                return None;
            }
        };

        match open(&payload, token) {
            Ok(items) => {
                debug!(path = %self.path.display(), count = items.len(), "item cache loaded");
                Some(items)
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "discarding item cache");
                self.discard().await;
                None
            }
        }
    }

    /// Replaces the file with `items` sealed under `token`.
    pub async fn save(&self, token: &str, items: &[Value]) -> Result<()> {
        let payload = seal(items, token)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), count = items.len(), "item cache written");
        Ok(())
    }

    /// Deletes the file; a missing file is fine.
    pub async fn discard(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "item cache not removed"),
        }
    }
}

fn file_safe(vault: &str) -> String {
    vault
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

fn cipher(token: &str) -> Result<Aes256Gcm> {
    let key = Sha256::digest(token.as_bytes());
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| OppyError::Cache("key material has invalid length".to_string()))
}

fn seal(items: &[Value], token: &str) -> Result<String> {
    let plaintext = serde_json::to_vec(items)?;

    let mut nonce = [0u8; NONCE_BYTES];
    use aes_gcm::aead::rand_core::RngCore as _;
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher(token)?
        .encrypt(
            (&nonce).into(),
            Payload {
                msg: &plaintext,
                aad: AAD,
            },
        )
        .map_err(|_| OppyError::Cache("encryption failed".to_string()))?;

    let mut payload = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(format!("{FORMAT_PREFIX}{}", BASE64_STANDARD.encode(payload)))
}

fn open(payload: &str, token: &str) -> Result<Vec<Value>> {
    let encoded = payload
        .trim()
        .strip_prefix(FORMAT_PREFIX)
        .ok_or_else(|| OppyError::Cache("unknown format".to_string()))?;
    let raw = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| OppyError::Cache("payload encoding is invalid".to_string()))?;
    if raw.len() <= NONCE_BYTES {
        return Err(OppyError::Cache("payload is truncated".to_string()));
    }

    let (nonce, ciphertext) = raw.split_at(NONCE_BYTES);
    let plaintext = cipher(token)?
        .decrypt(
            nonce.into(),
            Payload {
                msg: ciphertext,
                aad: AAD,
            },
        )
        .map_err(|_| OppyError::Cache("integrity check failed".to_string()))?;

    Ok(serde_json::from_slice(&plaintext)?)
}
