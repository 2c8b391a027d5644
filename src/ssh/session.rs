use std::sync::{Arc, Weak};
use std::time::Duration;

use super::process::{ProcessHandle, SshProcess};
use super::{AuthStatus, RemoteUri, SshConnector, SshSession};
use crate::credentials::{CredentialItem, CredentialsProvider};
use crate::errors::{AuthError, SshError};

/// What the Git transport needs from a remote shell.
pub trait RemoteSession: Send {
    /// Start `command` on the remote. `timeout` bounds [`SshProcess::wait_for`].
    fn exec(&mut self, command: &str, timeout: Option<Duration>) -> Result<SshProcess, SshError>;

    fn disconnect(&mut self);
}

/// Hands out authenticated sessions to the transport.
pub trait RemoteSessionFactory: Send + Sync {
    fn get_session(
        &self,
        uri: &RemoteUri,
        provider: &dyn CredentialsProvider,
    ) -> Result<Box<dyn RemoteSession>, SshError>;

    fn release_session(&self, mut session: Box<dyn RemoteSession>) {
        session.disconnect();
    }
}

/// An authenticated SSH connection that runs one remote command per channel.
pub struct SshRemoteSession {
    session: Option<Box<dyn SshSession>>,
    processes: Vec<Weak<ProcessHandle>>,
}

impl SshRemoteSession {
    /// Connect to `uri` and authenticate.
    ///
    /// Public key authentication is tried first without a passphrase. Only when
    /// the server denies it is `provider` asked for a secret, which is then used
    /// as the key passphrase and, failing that, as the account password.
    pub fn setup(
        connector: &dyn SshConnector,
        uri: &RemoteUri,
        provider: &dyn CredentialsProvider,
    ) -> Result<Self, SshError> {
        let mut session = connector.connect(&uri.host, uri.port, uri.user.as_deref())?;
        let target = uri.to_string();
        let mut prompted = false;

        let mut status = session.authenticate_public_key(None);
        if status == AuthStatus::Denied {
            tracing::debug!("Public key without passphrase denied for {}", uri.host);
            let mut items = [CredentialItem::password()];
            prompted = true;
            if !provider.get(&target, &mut items) {
                session.disconnect();
                return Err(SshError::Credentials(AuthError::NegotiationDenied));
            }
            let secret = items[0].value().unwrap_or_default().to_string();

            status = session.authenticate_public_key(Some(&secret));
            if status != AuthStatus::Success {
                status = session.authenticate_password(&secret);
            }
        }

        if status != AuthStatus::Success {
            tracing::warn!("SSH authentication to {} failed: {:?}", uri.host, status);
            if prompted {
                provider.reject_credentials(&target);
            }
            session.disconnect();
            return Err(SshError::AuthenticationFailed(status));
        }

        provider.cache_credentials_if_needed();
        Ok(Self {
            session: Some(session),
            processes: Vec::new(),
        })
    }
}

impl RemoteSession for SshRemoteSession {
    fn exec(&mut self, command: &str, timeout: Option<Duration>) -> Result<SshProcess, SshError> {
        let session = self.session.as_mut().ok_or(SshError::NotConnected)?;
        tracing::debug!("Running remote command {}", command);

        let channel = session.open_exec_channel(command)?;
        let process = SshProcess::new(channel, timeout);
        self.processes.retain(|handle| handle.strong_count() > 0);
        self.processes.push(Arc::downgrade(process.handle()));
        Ok(process)
    }

    fn disconnect(&mut self) {
        for handle in self.processes.drain(..) {
            if let Some(handle) = handle.upgrade() {
                handle.destroy();
            }
        }
        if let Some(mut session) = self.session.take() {
            session.disconnect();
        }
    }
}

impl Drop for SshRemoteSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub struct SshSessionFactory {
    connector: Arc<dyn SshConnector>,
}

impl SshSessionFactory {
    pub fn new(connector: Arc<dyn SshConnector>) -> Self {
        Self { connector }
    }
}

impl RemoteSessionFactory for SshSessionFactory {
    fn get_session(
        &self,
        uri: &RemoteUri,
        provider: &dyn CredentialsProvider,
    ) -> Result<Box<dyn RemoteSession>, SshError> {
        if !uri.is_ssh() {
            return Err(SshError::InvalidUri(uri.to_string()));
        }
        let session = SshRemoteSession::setup(self.connector.as_ref(), uri, provider)?;
        Ok(Box::new(session))
    }
}
