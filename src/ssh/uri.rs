use std::fmt;

use crate::errors::SshError;

/// A remote location in one of the forms Git accepts:
/// `scheme://[user@]host[:port]/path` or scp-like `[user@]host:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    /// `None` for the scp-like form.
    pub scheme: Option<String>,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

impl RemoteUri {
    pub fn parse(raw: &str) -> Result<Self, SshError> {
        let raw = raw.trim();
        let invalid = || SshError::InvalidUri(raw.to_string());

        if let Some((scheme, rest)) = raw.split_once("://") {
            if scheme.is_empty() {
                return Err(invalid());
            }
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let (user, host_port) = split_user(authority);
            let (host, port) = split_port(host_port).ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }

            return Ok(Self {
                scheme: Some(scheme.to_ascii_lowercase()),
                user,
                host: host.to_string(),
                port,
                path: path.to_string(),
            });
        }

        // scp-like syntax needs a ':' before any '/'.
        let colon = raw.find(':').ok_or_else(invalid)?;
        if raw[..colon].contains('/') {
            return Err(invalid());
        }
        let (user, host) = split_user(&raw[..colon]);
        let path = &raw[colon + 1..];
        if host.is_empty() || path.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            scheme: None,
            user,
            host: host.to_string(),
            port: None,
            path: path.to_string(),
        })
    }

    pub fn is_ssh(&self) -> bool {
        match self.scheme.as_deref() {
            None => true,
            Some(scheme) => matches!(scheme, "ssh" | "git+ssh" | "ssh+git"),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self.scheme.as_deref(), Some("http" | "https"))
    }

    /// Path as the remote shell expects it: `ssh://host/repo.git` names `repo.git`
    /// relative to the login directory, scp-like paths are passed through.
    pub fn remote_path(&self) -> &str {
        match self.scheme {
            Some(_) => self.path.trim_start_matches('/'),
            None => &self.path,
        }
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        match self.scheme {
            Some(_) => write!(f, "{}", self.path),
            None => write!(f, ":{}", self.path),
        }
    }
}

fn split_user(authority: &str) -> (Option<String>, &str) {
    match authority.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user.to_string()), host),
        Some((_, host)) => (None, host),
        None => (None, authority),
    }
}

fn split_port(host_port: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if tail.is_empty() => Some((host, None)),
            None => None,
        };
    }

    match host_port.rsplit_once(':') {
        Some((host, "")) => Some((host, None)),
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((host_port, None)),
    }
}
