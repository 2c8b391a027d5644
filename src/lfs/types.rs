//! Git LFS batch API wire types and the LFS error taxonomy.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{AuthError, SshError};

pub const AUTH_HEADER: &str = "Authorization";
pub const ACCEPT_HEADER: &str = "Accept";
pub const LFS_JSON_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs";

/// Whether `headers` already carry an `Authorization` header (names compare case-insensitively).
pub fn has_authorization(headers: &HashMap<String, String>) -> bool {
    headers.keys().any(|name| name.eq_ignore_ascii_case(AUTH_HEADER))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsObjectBatch {
    pub oid: String,
    pub size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsRef {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsBatchRequest {
    pub operation: Operation,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<LfsRef>,
    pub objects: Vec<LfsObjectBatch>,
    pub transfers: Vec<String>,
    pub hash_algo: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsBatchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<String>,
    pub objects: Vec<LfsObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algo: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsObject {
    pub oid: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<LfsActions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LfsObjectError>,
}

impl LfsObject {
    pub fn action(&self, kind: ActionKind) -> Option<&LfsAction> {
        let actions = self.actions.as_ref()?;
        match kind {
            ActionKind::Download => actions.download.as_ref(),
            ActionKind::Upload => actions.upload.as_ref(),
            ActionKind::Verify => actions.verify.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Download,
    Upload,
    Verify,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LfsActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<LfsAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<LfsAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<LfsAction>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsAction {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsObjectError {
    pub code: u16,
    pub message: String,
}

/// Short-lived endpoint and headers for one LFS operation, as returned by
/// `git-lfs-authenticate`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LfsAuthorization {
    pub href: String,
    #[serde(rename = "header", default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl LfsAuthorization {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            headers: HashMap::new(),
            expires_at: None,
            expires_in: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum LfsError {
    /// Non-2xx response. 401 asks the retry policy for new credentials.
    #[error("LFS server responded with HTTP {code}")]
    HttpError { code: u16 },

    #[error("LFS protocol error: {0}")]
    Protocol(String),

    #[error("SSH LFS Authentication failed, server returned invalid empty data.")]
    EmptyAuthenticationResponse,

    #[error("Network error: {0}")]
    Network(String),

    /// The batch response reported an error for this object.
    #[error("LFS object {oid} failed with code {code}: {message}")]
    Object {
        oid: String,
        code: u16,
        message: String,
    },

    #[error(transparent)]
    Credentials(#[from] AuthError),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl LfsError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LfsError::HttpError { code: 401 })
    }
}

impl From<serde_json::Error> for LfsError {
    fn from(e: serde_json::Error) -> Self {
        LfsError::Protocol(e.to_string())
    }
}

impl From<reqwest::Error> for LfsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LfsError::Protocol(e.to_string())
        } else if let Some(status) = e.status() {
            LfsError::HttpError {
                code: status.as_u16(),
            }
        } else {
            LfsError::Network(e.to_string())
        }
    }
}
