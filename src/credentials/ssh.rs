use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use super::cache::CredentialsCache;
use super::provider::{CredentialField, CredentialItem, CredentialsProvider, find_slot};
use super::state::CredentialsStateManager;
use crate::config::AuthConfig;

/// Supplies the key passphrase (or account password) the SSH adapter asks for
/// when public key authentication without a passphrase was denied.
pub struct SshCredentialsProvider {
    state: Arc<CredentialsStateManager>,
    cache: Arc<CredentialsCache>,
    cache_in_memory: bool,
    cancel: CancellationToken,
    pending: Mutex<Option<(String, String)>>,
}

impl SshCredentialsProvider {
    pub fn new(
        state: Arc<CredentialsStateManager>,
        cache: Arc<CredentialsCache>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            state,
            cache,
            cache_in_memory: config.cache_credentials_in_memory,
            cancel: CancellationToken::new(),
            pending: Mutex::new(None),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl CredentialsProvider for SshCredentialsProvider {
    fn is_interactive(&self) -> bool {
        true
    }

    fn supports(&self, items: &[CredentialItem]) -> bool {
        matches!(items, [CredentialItem::Password(_)])
    }

    fn get(&self, uri: &str, items: &mut [CredentialItem]) -> bool {
        let Some(slot) = find_slot(items, CredentialField::Password) else {
            return false;
        };

        if self.cache_in_memory {
            if let Some(cached) = self.cache.get(uri, false) {
                tracing::debug!("Using cached SSH passphrase for {}", uri);
                return items[slot].set_value(&cached.password);
            }
        }

        match self.state.blocking_request_ssh(&self.cancel) {
            Ok(password) => {
                items[slot].set_value(&password);
                if self.cache_in_memory {
                    *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some((uri.to_string(), password));
                }
                true
            }
            Err(e) => {
                tracing::warn!("No SSH passphrase for {}: {}", uri, e);
                false
            }
        }
    }

    fn cache_credentials_if_needed(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some((url, password)) = pending {
            if let Err(e) = self.cache.put(&url, false, None, &password) {
                tracing::warn!("Failed to cache SSH passphrase for {}: {}", url, e);
            }
        }
    }

    fn reject_credentials(&self, uri: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if self.cache.remove(uri, false) {
            tracing::debug!("Dropped rejected SSH passphrase for {}", uri);
        }
    }
}
