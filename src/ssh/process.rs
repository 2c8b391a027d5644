//! A remote command running on one SSH exec channel, exposed like a local
//! child process.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::SshChannel;
use crate::errors::SshError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct ProcessHandle {
    channel: Mutex<Box<dyn SshChannel>>,
    destroyed: AtomicBool,
}

impl ProcessHandle {
    fn channel(&self) -> MutexGuard<'_, Box<dyn SshChannel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.channel().close();
        }
    }
}

pub struct SshProcess {
    handle: Arc<ProcessHandle>,
    timeout: Option<Duration>,
}

impl SshProcess {
    pub(crate) fn new(channel: Box<dyn SshChannel>, timeout: Option<Duration>) -> Self {
        Self {
            handle: Arc::new(ProcessHandle {
                channel: Mutex::new(channel),
                destroyed: AtomicBool::new(false),
            }),
            timeout,
        }
    }

    pub(crate) fn handle(&self) -> &Arc<ProcessHandle> {
        &self.handle
    }

    /// Writer feeding the remote command's standard input.
    pub fn stdin(&self) -> ChannelWriter {
        ChannelWriter {
            handle: self.handle.clone(),
        }
    }

    pub fn stdout(&self) -> ChannelReader {
        ChannelReader {
            handle: self.handle.clone(),
            stderr: false,
        }
    }

    /// Reader over the remote standard error. It reports end of stream as soon
    /// as the channel has no stderr bytes pending, so it never blocks.
    pub fn stderr(&self) -> ChannelReader {
        ChannelReader {
            handle: self.handle.clone(),
            stderr: true,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.destroyed.load(Ordering::SeqCst) && self.handle.channel().is_open()
    }

    /// Exit status of a finished command.
    pub fn exit_status(&self) -> Result<i32, SshError> {
        if self.is_running() {
            return Err(SshError::StillRunning);
        }
        self.handle.channel().exit_status().ok_or(SshError::NoExitStatus)
    }

    /// Poll until the command finishes, giving up with `StillRunning` once the
    /// exec timeout, if any, has elapsed.
    pub fn wait_for(&self) -> Result<i32, SshError> {
        let started = Instant::now();
        while self.is_running() {
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    tracing::warn!("Remote command still running after {:?}", limit);
                    return Err(SshError::StillRunning);
                }
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
        self.exit_status()
    }

    /// Close the channel. Calling it again is a no-op.
    pub fn destroy(&self) {
        self.handle.destroy();
    }
}

impl Drop for SshProcess {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub struct ChannelReader {
    handle: Arc<ProcessHandle>,
    stderr: bool,
}

impl Read for ChannelReader {
    /// The channel lock is only taken to poll and to read bytes that are
    /// already buffered, so status checks, stdin writes and `destroy` from
    /// other threads are never stuck behind a read waiting on the remote.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.handle.destroyed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            {
                let mut channel = self.handle.channel();
                if channel.poll_has_bytes(self.stderr) {
                    return channel.read(buf, self.stderr);
                }
                if self.stderr || !channel.is_open() {
                    return Ok(0);
                }
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }
}

pub struct ChannelWriter {
    handle: Arc<ProcessHandle>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.handle.destroyed.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "SSH channel has been closed",
            ));
        }
        self.handle.channel().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
