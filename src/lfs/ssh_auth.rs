use std::io::Read;
use std::sync::Arc;

use super::types::{LfsAuthorization, LfsError, Operation};
use crate::credentials::CredentialsProvider;
use crate::ssh::{RemoteSession, RemoteUri, SshConnector, SshRemoteSession};

/// Obtains LFS authorizations for SSH remotes by running `git-lfs-authenticate`.
#[derive(Clone)]
pub struct LfsSshAuthenticator {
    connector: Arc<dyn SshConnector>,
    provider: Arc<dyn CredentialsProvider>,
}

impl LfsSshAuthenticator {
    pub fn new(connector: Arc<dyn SshConnector>, provider: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            connector,
            provider,
        }
    }

    pub async fn authenticate(
        &self,
        lfs_server_url: &str,
        operation: Operation,
    ) -> Result<LfsAuthorization, LfsError> {
        let authenticator = self.clone();
        let url = lfs_server_url.to_string();
        tokio::task::spawn_blocking(move || authenticator.authenticate_blocking(&url, operation))
            .await
            .map_err(|e| LfsError::Io(std::io::Error::other(e)))?
    }

    /// Blocking variant of [`Self::authenticate`]; must run on a worker thread.
    pub fn authenticate_blocking(
        &self,
        lfs_server_url: &str,
        operation: Operation,
    ) -> Result<LfsAuthorization, LfsError> {
        let uri = RemoteUri::parse(lfs_server_url)?;
        let mut session =
            SshRemoteSession::setup(self.connector.as_ref(), &uri, self.provider.as_ref())?;

        let command = format!("git-lfs-authenticate {} {}", uri.remote_path(), operation);
        let process = session.exec(&command, None)?;

        let mut stdout = Vec::new();
        process.stdout().read_to_end(&mut stdout)?;
        let mut stderr = Vec::new();
        process.stderr().read_to_end(&mut stderr)?;

        process.destroy();
        session.disconnect();
        parse_authentication_output(&stdout, &stderr)
    }
}

/// Interpret the output of `git-lfs-authenticate`. Any stderr text is an error,
/// even when stdout carries a response.
pub fn parse_authentication_output(
    stdout: &[u8],
    stderr: &[u8],
) -> Result<LfsAuthorization, LfsError> {
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.trim().is_empty() {
        return Err(LfsError::Protocol(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(stdout);
    if stdout.trim().is_empty() {
        return Err(LfsError::EmptyAuthenticationResponse);
    }

    Ok(serde_json::from_str(stdout.trim())?)
}
