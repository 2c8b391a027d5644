//! Short-lived, URL-keyed store of credentials that already worked.
//!
//! Entries live only in memory for the lifetime of the process. Passwords are
//! sealed with a random per-process AES-256-GCM key and are opened only when a
//! caller asks for them, so a memory dump does not show them in clear text.

use std::fmt;

use dashmap::DashMap;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::AuthError;

/// A credential handed out by [`CredentialsCache::get`].
#[derive(Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub url: String,
    pub is_lfs: bool,
    pub user: Option<String>,
    pub password: String,
}

impl fmt::Debug for CachedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredential")
            .field("url", &self.url)
            .field("is_lfs", &self.is_lfs)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    url: String,
    is_lfs: bool,
}

struct SealedEntry {
    user: Option<String>,
    nonce: [u8; NONCE_LEN],
    sealed_password: Vec<u8>,
}

pub struct CredentialsCache {
    entries: DashMap<CacheKey, SealedEntry>,
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialsCache {
    pub fn new() -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let mut key_bytes = [0u8; 32];
        rng.fill(&mut key_bytes)
            .map_err(|_| AuthError::Cache("Failed to generate cache key".to_string()))?;
        let key = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| AuthError::Cache("Invalid cache key".to_string()))?;

        Ok(Self {
            entries: DashMap::new(),
            key: LessSafeKey::new(key),
            rng,
        })
    }

    pub fn get(&self, url: &str, is_lfs: bool) -> Option<CachedCredential> {
        let key = CacheKey {
            url: url.to_string(),
            is_lfs,
        };
        let entry = self.entries.get(&key)?;

        let mut buffer = entry.sealed_password.clone();
        let opened = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(entry.nonce),
                Aad::from(url.as_bytes()),
                &mut buffer,
            )
            .ok()
            .and_then(|plain| String::from_utf8(plain.to_vec()).ok());

        match opened {
            Some(password) => Some(CachedCredential {
                url: key.url,
                is_lfs,
                user: entry.user.clone(),
                password,
            }),
            None => {
                tracing::warn!("Discarding unreadable cached credentials for {}", url);
                None
            }
        }
    }

    /// Store credentials for `(url, is_lfs)`, replacing any previous entry.
    pub fn put(
        &self,
        url: &str,
        is_lfs: bool,
        user: Option<&str>,
        password: &str,
    ) -> Result<(), AuthError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AuthError::Cache("Failed to generate nonce".to_string()))?;

        let mut sealed_password = password.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(url.as_bytes()),
                &mut sealed_password,
            )
            .map_err(|_| AuthError::Cache("Failed to seal password".to_string()))?;

        self.entries.insert(
            CacheKey {
                url: url.to_string(),
                is_lfs,
            },
            SealedEntry {
                user: user.map(str::to_string),
                nonce,
                sealed_password,
            },
        );
        tracing::debug!("Cached credentials for {} (lfs: {})", url, is_lfs);
        Ok(())
    }

    pub fn remove(&self, url: &str, is_lfs: bool) -> bool {
        self.entries
            .remove(&CacheKey {
                url: url.to_string(),
                is_lfs,
            })
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
