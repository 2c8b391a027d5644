//! Git-Remote-Auth: credential negotiation, SSH remote execution and a Git LFS
//! batch client for applications that run Git network operations in the background.
//!
//! Goals
//! - Let a background worker ask the interactive layer for secrets and suspend until
//!   they are supplied, denied or the request is cancelled.
//! - Satisfy the transport's callback contracts (HTTP credentials, SSH remote session)
//!   on top of that negotiation.
//! - Speak the Git LFS batch protocol with transparent retry on HTTP 401.
//!
//! Modules
//! - `credentials`: negotiation state, per-session registry, in-memory cache, suppliers.
//! - `ssh`: capability traits over an SSH library, remote processes and sessions.
//! - `lfs`: wire types, `git-lfs-authenticate`, retry policy, reqwest transport, client.
//! - `config`: settings shared by the suppliers and the LFS client.
//! - `errors`: negotiation and SSH error types.
//!
//! Typical Usage
//! - The interactive layer watches `CredentialsStateManager::subscribe()` and answers with
//!   `accept` or `deny`.
//! - The transport calls `HttpCredentialsProvider::get` from its worker thread.
//! - `LfsClient::download_objects` / `upload_objects` run the full LFS flows.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod lfs;
pub mod ssh;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::AuthConfig;
pub use credentials::{
    CredentialsAccepted, CredentialsCache, CredentialsKind, CredentialsProvider,
    CredentialsState, CredentialsStateManager, HttpCredentialsProvider, SshCredentialsProvider,
};
pub use errors::{AuthError, SshError};
pub use lfs::{LfsClient, LfsError};
