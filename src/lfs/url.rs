use crate::errors::SshError;
use crate::ssh::RemoteUri;

/// LFS server URL for a Git remote. HTTP(S) remotes serve LFS under
/// `<remote>/info/lfs`; SSH remotes are authenticated through `git-lfs-authenticate`
/// and are returned unchanged.
pub fn lfs_server_url(remote_url: &str) -> String {
    if is_http_or_https(remote_url) {
        format!("{}/info/lfs", remote_url.trim_end_matches('/'))
    } else {
        remote_url.to_string()
    }
}

pub fn is_http_or_https(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LfsEndpoint {
    Http(String),
    Ssh(RemoteUri),
}

impl LfsEndpoint {
    pub fn parse(lfs_server_url: &str) -> Result<Self, SshError> {
        if is_http_or_https(lfs_server_url) {
            return Ok(LfsEndpoint::Http(lfs_server_url.trim().to_string()));
        }

        let uri = RemoteUri::parse(lfs_server_url)?;
        if uri.is_ssh() {
            Ok(LfsEndpoint::Ssh(uri))
        } else {
            Err(SshError::InvalidUri(lfs_server_url.to_string()))
        }
    }
}
