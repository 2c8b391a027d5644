//! Git LFS batch API client.
//!
//! - `types`: batch request/response JSON and [`LfsError`].
//! - `url`: mapping a Git remote to its LFS server.
//! - `network`: the HTTP requests, with a `reqwest` implementation.
//! - `credentials`: the retry-on-401 policy shared by every request.
//! - `ssh_auth`: `git-lfs-authenticate` for SSH remotes.
//! - `client`: negotiate, download, upload and verify flows.

pub mod client;
pub mod credentials;
pub mod network;
pub mod ssh_auth;
pub mod types;
pub mod url;

pub use client::LfsClient;
pub use credentials::LfsCredentials;
pub use network::{LfsNetwork, ReqwestLfsNetwork};
pub use ssh_auth::{LfsSshAuthenticator, parse_authentication_output};
pub use types::{
    ActionKind, LfsAction, LfsActions, LfsAuthorization, LfsBatchRequest, LfsBatchResponse,
    LfsError, LfsObject, LfsObjectBatch, LfsObjectError, LfsRef, Operation,
};
pub use url::{LfsEndpoint, is_http_or_https, lfs_server_url};
