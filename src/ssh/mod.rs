//! Remote command execution over SSH, as the Git transport and the LFS
//! authentication client consume it.
//!
//! The SSH library itself stays behind three capability traits so that the
//! adapter only depends on what it needs:
//! - [`SshConnector`] opens a connection to a host.
//! - [`SshSession`] authenticates it and opens exec channels.
//! - [`SshChannel`] moves bytes for one remote command.
//!
//! All three are blocking. Async callers move the work to
//! `tokio::task::spawn_blocking`.

use std::io;

use crate::errors::SshError;

pub mod process;
pub mod session;
pub mod uri;

pub use process::{ChannelReader, ChannelWriter, SshProcess};
pub use session::{RemoteSession, RemoteSessionFactory, SshRemoteSession, SshSessionFactory};
pub use uri::RemoteUri;

/// Result of one authentication attempt, mirroring the libssh codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Success,
    Denied,
    Partial,
    Info,
    Again,
    Error,
}

pub trait SshConnector: Send + Sync {
    /// Connect to `host`. `port` is `None` when the remote URI had no explicit port.
    fn connect(
        &self,
        host: &str,
        port: Option<u16>,
        user: Option<&str>,
    ) -> Result<Box<dyn SshSession>, SshError>;
}

pub trait SshSession: Send {
    /// Authenticate with the user's default keys, unlocking them with `passphrase` if given.
    fn authenticate_public_key(&mut self, passphrase: Option<&str>) -> AuthStatus;

    fn authenticate_password(&mut self, password: &str) -> AuthStatus;

    /// Open a channel and request execution of `command` on it.
    fn open_exec_channel(&mut self, command: &str) -> Result<Box<dyn SshChannel>, SshError>;

    fn disconnect(&mut self);
}

pub trait SshChannel: Send {
    /// Read from stdout, or stderr when `stderr` is set. `Ok(0)` is end of stream.
    fn read(&mut self, buf: &mut [u8], stderr: bool) -> io::Result<usize>;

    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Whether bytes are ready. After `true`, the next `read` of the same
    /// stream must return without waiting on the remote.
    fn poll_has_bytes(&mut self, stderr: bool) -> bool;

    fn is_open(&self) -> bool;

    /// Exit status reported by the remote, once the command has finished.
    fn exit_status(&self) -> Option<i32>;

    fn close(&mut self);
}
