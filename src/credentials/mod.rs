//! Credentials negotiation between background Git workers and the interactive
//! layer, plus the suppliers the transports call into.

pub mod cache;
pub mod http;
pub mod provider;
pub mod sessions;
pub mod ssh;
pub mod state;

pub use cache::{CachedCredential, CredentialsCache};
pub use http::HttpCredentialsProvider;
pub use provider::{CredentialField, CredentialItem, CredentialsProvider};
pub use sessions::{CredentialsSessions, SessionId};
pub use ssh::SshCredentialsProvider;
pub use state::{CredentialsAccepted, CredentialsKind, CredentialsState, CredentialsStateManager};
