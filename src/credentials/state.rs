//! Observable holder of the current credentials negotiation.
//!
//! A background worker publishes `Requested(kind)` and suspends until the
//! interactive layer, which watches the state through [`CredentialsStateManager::subscribe`],
//! answers with [`CredentialsStateManager::accept`] or [`CredentialsStateManager::deny`].
//! The requesting call resets the slot to `None` once it has consumed the answer, and
//! also when it is cancelled, timed out or dropped, so a stale `Requested` never
//! outlives its requester.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::errors::AuthError;

/// Which secret a negotiation is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialsKind {
    /// Passphrase for an SSH key, or an SSH password.
    Ssh,
    /// Username and password for an HTTP(S) remote.
    Http,
    /// Username and password for a Git LFS server.
    Lfs,
}

impl fmt::Display for CredentialsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsKind::Ssh => write!(f, "SSH"),
            CredentialsKind::Http => write!(f, "HTTP"),
            CredentialsKind::Lfs => write!(f, "LFS"),
        }
    }
}

/// Payload supplied by the interactive layer.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialsAccepted {
    Ssh { password: String },
    Http { user: String, password: String },
    Lfs { user: String, password: String },
}

impl CredentialsAccepted {
    pub fn kind(&self) -> CredentialsKind {
        match self {
            CredentialsAccepted::Ssh { .. } => CredentialsKind::Ssh,
            CredentialsAccepted::Http { .. } => CredentialsKind::Http,
            CredentialsAccepted::Lfs { .. } => CredentialsKind::Lfs,
        }
    }
}

impl fmt::Debug for CredentialsAccepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsAccepted::Ssh { .. } => f
                .debug_struct("Ssh")
                .field("password", &"<redacted>")
                .finish(),
            CredentialsAccepted::Http { user, .. } => f
                .debug_struct("Http")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            CredentialsAccepted::Lfs { user, .. } => f
                .debug_struct("Lfs")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// State of the current negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialsState {
    #[default]
    None,
    Requested(CredentialsKind),
    Denied,
    Accepted(CredentialsAccepted),
}

impl CredentialsState {
    /// `Accepted` and `Denied` end a negotiation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CredentialsState::Denied | CredentialsState::Accepted(_))
    }
}

/// Single negotiation slot shared by one repository session.
pub struct CredentialsStateManager {
    state: watch::Sender<CredentialsState>,
    negotiation: Mutex<()>,
}

impl Default for CredentialsStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialsStateManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CredentialsState::None);
        Self {
            state,
            negotiation: Mutex::new(()),
        }
    }

    /// Non-blocking read of the current state.
    pub fn current(&self) -> CredentialsState {
        self.state.borrow().clone()
    }

    /// Stream of state changes for the interactive layer.
    pub fn subscribe(&self) -> watch::Receiver<CredentialsState> {
        self.state.subscribe()
    }

    /// Answer the pending request. Returns `false` if nothing was requested.
    pub fn accept(&self, credentials: CredentialsAccepted) -> bool {
        let kind = credentials.kind();
        let accepted = self.state.send_if_modified(|state| {
            if matches!(state, CredentialsState::Requested(_)) {
                *state = CredentialsState::Accepted(credentials);
                true
            } else {
                false
            }
        });

        if !accepted {
            tracing::warn!("Ignoring {} credentials, no request is pending", kind);
        }
        accepted
    }

    /// Refuse the pending request. Returns `false` if nothing was requested.
    pub fn deny(&self) -> bool {
        let denied = self.state.send_if_modified(|state| {
            if matches!(state, CredentialsState::Requested(_)) {
                *state = CredentialsState::Denied;
                true
            } else {
                false
            }
        });

        if !denied {
            tracing::warn!("Ignoring credentials denial, no request is pending");
        }
        denied
    }

    /// Clear whatever the slot holds.
    pub fn reset(&self) {
        self.state.send_replace(CredentialsState::None);
    }

    /// Publish `Requested(kind)` and wait until the interactive layer answers.
    pub async fn request(
        &self,
        kind: CredentialsKind,
        cancel: &CancellationToken,
    ) -> Result<CredentialsAccepted, AuthError> {
        let _negotiation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::NegotiationCancelled),
            guard = self.negotiation.lock() => guard,
        };

        let mut receiver = self.state.subscribe();
        let _reset = ResetOnDrop(&self.state);
        self.state.send_replace(CredentialsState::Requested(kind));
        tracing::debug!("Requested {} credentials", kind);

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("{} credentials request cancelled", kind);
                return Err(AuthError::NegotiationCancelled);
            }
            answer = async {
                receiver
                    .wait_for(CredentialsState::is_terminal)
                    .await
                    .map(|state| state.clone())
            } => answer,
        };

        match answer {
            Ok(CredentialsState::Accepted(credentials)) if credentials.kind() == kind => {
                tracing::debug!("{} credentials accepted", kind);
                Ok(credentials)
            }
            Ok(CredentialsState::Accepted(credentials)) => Err(AuthError::UnexpectedCredentials {
                expected: kind,
                received: credentials.kind(),
            }),
            Ok(_) => {
                tracing::debug!("{} credentials denied", kind);
                Err(AuthError::NegotiationDenied)
            }
            // The sender lives in `self`, so the channel cannot close while we wait.
            Err(_) => Err(AuthError::NegotiationCancelled),
        }
    }

    /// [`Self::request`] bounded by an optional timeout.
    pub async fn request_with_timeout(
        &self,
        kind: CredentialsKind,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<CredentialsAccepted, AuthError> {
        match timeout {
            None => self.request(kind, cancel).await,
            Some(limit) => tokio::time::timeout(limit, self.request(kind, cancel))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!("{} credentials request timed out after {:?}", kind, limit);
                    Err(AuthError::NegotiationTimedOut(limit))
                }),
        }
    }

    /// Blocking bridge for synchronous transport callbacks.
    ///
    /// Must not be called from an async task; run it on a worker thread.
    pub fn blocking_request(
        &self,
        kind: CredentialsKind,
        cancel: &CancellationToken,
    ) -> Result<CredentialsAccepted, AuthError> {
        futures::executor::block_on(self.request(kind, cancel))
    }

    pub async fn request_http(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(String, String), AuthError> {
        user_password(CredentialsKind::Http, self.request(CredentialsKind::Http, cancel)).await
    }

    pub async fn request_lfs(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<(String, String), AuthError> {
        user_password(
            CredentialsKind::Lfs,
            self.request_with_timeout(CredentialsKind::Lfs, cancel, timeout),
        )
        .await
    }

    pub async fn request_ssh(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        match self.request(CredentialsKind::Ssh, cancel).await? {
            CredentialsAccepted::Ssh { password } => Ok(password),
            other => Err(AuthError::UnexpectedCredentials {
                expected: CredentialsKind::Ssh,
                received: other.kind(),
            }),
        }
    }

    pub fn blocking_request_http(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(String, String), AuthError> {
        futures::executor::block_on(self.request_http(cancel))
    }

    pub fn blocking_request_ssh(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        futures::executor::block_on(self.request_ssh(cancel))
    }
}

async fn user_password(
    kind: CredentialsKind,
    answer: impl Future<Output = Result<CredentialsAccepted, AuthError>>,
) -> Result<(String, String), AuthError> {
    match answer.await? {
        CredentialsAccepted::Http { user, password } | CredentialsAccepted::Lfs { user, password } => {
            Ok((user, password))
        }
        other => Err(AuthError::UnexpectedCredentials {
            expected: kind,
            received: other.kind(),
        }),
    }
}

struct ResetOnDrop<'a>(&'a watch::Sender<CredentialsState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(CredentialsState::None);
    }
}
