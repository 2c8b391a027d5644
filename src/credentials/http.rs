//! HTTP(S) credentials supplier for the transport's authentication challenge.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use super::cache::CredentialsCache;
use super::provider::{CredentialField, CredentialItem, CredentialsProvider, find_slot};
use super::state::CredentialsStateManager;
use crate::config::AuthConfig;

struct PendingCredentials {
    url: String,
    user: String,
    password: String,
}

/// Answers username/password challenges from the cache or by asking the
/// interactive layer through the negotiation state.
pub struct HttpCredentialsProvider {
    state: Arc<CredentialsStateManager>,
    cache: Arc<CredentialsCache>,
    cache_in_memory: bool,
    cancel: CancellationToken,
    pending: Mutex<Option<PendingCredentials>>,
}

impl HttpCredentialsProvider {
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

    /// Tie prompts to the caller's cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl CredentialsProvider for HttpCredentialsProvider {
    fn is_interactive(&self) -> bool {
        true
    }

    fn supports(&self, items: &[CredentialItem]) -> bool {
        if items.is_empty() {
            return true;
        }

        let fields: HashSet<CredentialField> = items.iter().map(CredentialItem::field).collect();
        items.len() == 2
            && fields.contains(&CredentialField::Username)
            && fields.contains(&CredentialField::Password)
    }

    fn get(&self, uri: &str, items: &mut [CredentialItem]) -> bool {
        let (Some(user_slot), Some(password_slot)) = (
            find_slot(items, CredentialField::Username),
            find_slot(items, CredentialField::Password),
        ) else {
            tracing::warn!("HTTP credentials requested without username/password slots: {:?}", items);
            return false;
        };

        if self.cache_in_memory {
            if let Some(cached) = self.cache.get(uri, false) {
                tracing::debug!("Using cached HTTP credentials for {}", uri);
                items[user_slot].set_value(cached.user.as_deref().unwrap_or_default());
                items[password_slot].set_value(&cached.password);
                return true;
            }
        }

        match self.state.blocking_request_http(&self.cancel) {
            Ok((user, password)) => {
                items[user_slot].set_value(&user);
                items[password_slot].set_value(&password);

                if self.cache_in_memory {
                    *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(PendingCredentials {
                            url: uri.to_string(),
                            user,
                            password,
                        });
                }
                true
            }
            Err(e) => {
                tracing::warn!("No HTTP credentials for {}: {}", uri, e);
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

        if let Some(pending) = pending {
            if let Err(e) = self
                .cache
                .put(&pending.url, false, Some(&pending.user), &pending.password)
            {
                tracing::warn!("Failed to cache HTTP credentials for {}: {}", pending.url, e);
            }
        }
    }

    fn reject_credentials(&self, uri: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if self.cache.remove(uri, false) {
            tracing::debug!("Dropped rejected HTTP credentials for {}", uri);
        }
    }
}
