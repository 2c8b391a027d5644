//! Error types for credential negotiation and the SSH remote-exec adapter.
//!
//! LFS failures have their own closed taxonomy in [`crate::lfs::LfsError`],
//! because the retry policy needs to tell "retry with new credentials" apart
//! from "fail". Both enums here integrate with `thiserror`.

use std::time::Duration;

use thiserror::Error;

use crate::credentials::CredentialsKind;
use crate::ssh::AuthStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Outcome of a credentials negotiation that did not produce usable credentials.
pub enum AuthError {
    /// The caller's task was cancelled while waiting for an answer.
    #[error("Credentials negotiation was cancelled")]
    NegotiationCancelled,

    /// The interactive layer explicitly refused to provide credentials.
    #[error("Credentials request was denied")]
    NegotiationDenied,

    /// Nobody answered within the configured prompt timeout.
    #[error("Credentials negotiation timed out after {0:?}")]
    NegotiationTimedOut(Duration),

    /// The interactive layer answered with a payload for another kind of request.
    #[error("Expected {expected} credentials but {received} credentials were provided")]
    UnexpectedCredentials {
        expected: CredentialsKind,
        received: CredentialsKind,
    },

    /// The in-memory credential cache could not seal or open a secret.
    #[error("Credentials cache error: {0}")]
    Cache(String),
}

#[derive(Error, Debug)]
/// Errors raised while connecting, authenticating or executing over SSH.
pub enum SshError {
    /// The remote string is neither `scheme://` nor scp-like.
    #[error("The `{0}` is not a valid remote URI.")]
    InvalidUri(String),

    /// The connector could not reach or handshake with the host.
    #[error("Could not connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// Every authentication method was tried; carries the last status.
    #[error("SSH authentication failed with status {0:?}")]
    AuthenticationFailed(AuthStatus),

    /// The session was already disconnected.
    #[error("SSH session is not connected")]
    NotConnected,

    /// Opening or driving an exec channel failed.
    #[error("SSH channel error: {0}")]
    Channel(String),

    /// An exit status was asked for before the remote command finished.
    #[error("Process is still running")]
    StillRunning,

    /// The remote command ended without an exit status.
    #[error("Channel closed without reporting an exit status")]
    NoExitStatus,

    /// No usable secret came out of the credentials negotiation.
    #[error(transparent)]
    Credentials(#[from] AuthError),

    /// Reading from or writing to the remote command failed.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
