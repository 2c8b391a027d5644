//! Retry-on-401 policy wrapped around every LFS network call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::types::{LfsError, has_authorization};
use crate::config::AuthConfig;
use crate::credentials::{CredentialsCache, CredentialsStateManager};

pub struct LfsCredentials {
    state: Arc<CredentialsStateManager>,
    cache: Arc<CredentialsCache>,
    config: AuthConfig,
    cancel: CancellationToken,
}

fn is_unauthorized<T>(result: &Result<T, LfsError>) -> bool {
    matches!(result, Err(e) if e.is_unauthorized())
}

impl LfsCredentials {
    pub fn new(
        state: Arc<CredentialsStateManager>,
        cache: Arc<CredentialsCache>,
        config: AuthConfig,
    ) -> Self {
        Self {
            state,
            cache,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `f` with escalating credentials until the server stops answering 401.
    ///
    /// Pre-authorized `headers` get a single anonymous call. Otherwise `f` is
    /// tried anonymously, then with the credential cached for `(url, lfs)`, then
    /// with credentials asked from the interactive layer, once per 401. The
    /// prompt loop ends on the first non-401 result, on a denied or cancelled
    /// prompt, or after `lfs_max_prompt_attempts` prompts.
    pub async fn provide<T, F, Fut>(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        mut f: F,
    ) -> Result<T, LfsError>
    where
        F: FnMut(Option<String>, Option<String>) -> Fut,
        Fut: Future<Output = Result<T, LfsError>>,
    {
        if has_authorization(headers) {
            return f(None, None).await;
        }

        let mut result = f(None, None).await;
        if !is_unauthorized(&result) {
            return result;
        }

        if let Some(cached) = self.cache.get(url, true) {
            tracing::debug!("Retrying {} with cached LFS credentials", url);
            result = f(cached.user, Some(cached.password)).await;
            if !is_unauthorized(&result) {
                return result;
            }
        }

        let mut prompts = 0usize;
        loop {
            if let Some(max) = self.config.lfs_max_prompt_attempts {
                if prompts >= max {
                    tracing::warn!("Giving up on {} after {} credential prompts", url, prompts);
                    return result;
                }
            }
            prompts += 1;

            let (user, password) = self
                .state
                .request_lfs(&self.cancel, self.config.prompt_timeout())
                .await?;
            result = f(Some(user.clone()), Some(password.clone())).await;

            if !is_unauthorized(&result) {
                if result.is_ok() && self.config.cache_credentials_in_memory {
                    if let Err(e) = self.cache.put(url, true, Some(&user), &password) {
                        tracing::warn!("Failed to cache LFS credentials for {}: {}", url, e);
                    }
                }
                return result;
            }
            tracing::debug!("LFS server at {} rejected the provided credentials", url);
        }
    }
}
