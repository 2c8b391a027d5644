//! Shared test helpers: logger setup, a scripted interactive layer, and mocks
//! for the SSH primitive and the LFS HTTP transport.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing_subscriber::util::SubscriberInitExt;

use crate::credentials::{
    CredentialItem, CredentialsAccepted, CredentialsProvider, CredentialsState,
    CredentialsStateManager,
};
use crate::errors::SshError;
use crate::lfs::{LfsBatchRequest, LfsBatchResponse, LfsError, LfsNetwork};
use crate::ssh::{AuthStatus, SshChannel, SshConnector, SshSession};

pub(crate) fn init_logger() {
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_target(false)
        .without_time()
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .finish()
        .try_init(); // avoid multi-init
}

fn answer(manager: &CredentialsStateManager, answer: Option<CredentialsAccepted>) {
    match answer {
        Some(credentials) => manager.accept(credentials),
        None => manager.deny(),
    };
}

fn is_requested(state: &CredentialsState) -> bool {
    matches!(state, CredentialsState::Requested(_))
}

/// Play the interactive layer: answer the next `answers.len()` requests in order,
/// `None` meaning deny.
pub(crate) fn answer_requests(
    manager: Arc<CredentialsStateManager>,
    answers: Vec<Option<CredentialsAccepted>>,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = manager.subscribe();
    tokio::spawn(async move {
        for next in answers {
            if receiver.wait_for(is_requested).await.is_err() {
                return;
            }
            answer(&manager, next);
        }
    })
}

pub(crate) fn answer_next_request(
    manager: Arc<CredentialsStateManager>,
    next: Option<CredentialsAccepted>,
) -> tokio::task::JoinHandle<()> {
    answer_requests(manager, vec![next])
}

/// Same as [`answer_next_request`] for tests without a runtime.
pub(crate) fn answer_next_request_blocking(
    manager: Arc<CredentialsStateManager>,
    next: Option<CredentialsAccepted>,
) -> std::thread::JoinHandle<()> {
    let mut receiver = manager.subscribe();
    std::thread::spawn(move || {
        let requested = futures::executor::block_on(receiver.wait_for(is_requested)).is_ok();
        if requested {
            answer(&manager, next);
        }
    })
}

#[derive(Default)]
struct ChannelInner {
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    open: bool,
    exit_status: Option<i32>,
    written: Vec<u8>,
    close_calls: usize,
}

#[derive(Default)]
pub(crate) struct MockChannelState {
    inner: Mutex<ChannelInner>,
}

impl MockChannelState {
    pub(crate) fn finish(&self, status: Option<i32>) {
        let mut inner = self.inner.lock().unwrap();
        inner.open = false;
        inner.exit_status = status;
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.inner.lock().unwrap().close_calls
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }
}

pub(crate) struct MockChannel {
    state: Arc<MockChannelState>,
}

impl MockChannel {
    fn new(stdout: &[u8], stderr: &[u8], open: bool, exit_status: Option<i32>) -> Self {
        let state = MockChannelState {
            inner: Mutex::new(ChannelInner {
                stdout: stdout.iter().copied().collect(),
                stderr: stderr.iter().copied().collect(),
                open,
                exit_status,
                ..ChannelInner::default()
            }),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// A command that already exited; its output is still buffered.
    pub(crate) fn finished(stdout: &[u8], stderr: &[u8], exit_status: Option<i32>) -> Self {
        Self::new(stdout, stderr, false, exit_status)
    }

    pub(crate) fn running(stdout: &[u8], stderr: &[u8]) -> Self {
        Self::new(stdout, stderr, true, None)
    }

    pub(crate) fn state(&self) -> Arc<MockChannelState> {
        self.state.clone()
    }
}

impl SshChannel for MockChannel {
    fn read(&mut self, buf: &mut [u8], stderr: bool) -> io::Result<usize> {
        let mut inner = self.state.inner.lock().unwrap();
        let source = if stderr {
            &mut inner.stderr
        } else {
            &mut inner.stdout
        };
        let n = buf.len().min(source.len());
        for (slot, byte) in buf.iter_mut().zip(source.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.state.inner.lock().unwrap().written.extend_from_slice(data);
        Ok(data.len())
    }

    fn poll_has_bytes(&mut self, stderr: bool) -> bool {
        let inner = self.state.inner.lock().unwrap();
        if stderr {
            !inner.stderr.is_empty()
        } else {
            !inner.stdout.is_empty()
        }
    }

    fn is_open(&self) -> bool {
        self.state.inner.lock().unwrap().open
    }

    fn exit_status(&self) -> Option<i32> {
        self.state.inner.lock().unwrap().exit_status
    }

    fn close(&mut self) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.open = false;
        inner.close_calls += 1;
    }
}

struct ConnectorScript {
    public_key: AuthStatus,
    public_key_with_passphrase: AuthStatus,
    password: AuthStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    calls: Mutex<Vec<String>>,
}

impl ConnectorScript {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// SSH connector whose sessions follow a fixed script and log every call.
#[derive(Clone)]
pub(crate) struct MockConnector {
    script: Arc<ConnectorScript>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            script: Arc::new(ConnectorScript {
                public_key: AuthStatus::Success,
                public_key_with_passphrase: AuthStatus::Success,
                password: AuthStatus::Success,
                stdout: Vec::new(),
                stderr: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    fn update(self, f: impl FnOnce(&mut ConnectorScript)) -> Self {
        let mut script = Arc::try_unwrap(self.script)
            .unwrap_or_else(|_| panic!("configure the connector before sharing it"));
        f(&mut script);
        Self {
            script: Arc::new(script),
        }
    }

    pub(crate) fn with_auth(
        self,
        public_key: AuthStatus,
        public_key_with_passphrase: AuthStatus,
        password: AuthStatus,
    ) -> Self {
        self.update(|script| {
            script.public_key = public_key;
            script.public_key_with_passphrase = public_key_with_passphrase;
            script.password = password;
        })
    }

    /// Output of every command executed through this connector's sessions.
    pub(crate) fn with_output(self, stdout: &[u8], stderr: &[u8]) -> Self {
        self.update(|script| {
            script.stdout = stdout.to_vec();
            script.stderr = stderr.to_vec();
        })
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.calls.lock().unwrap().clone()
    }
}

impl SshConnector for MockConnector {
    fn connect(
        &self,
        host: &str,
        port: Option<u16>,
        user: Option<&str>,
    ) -> Result<Box<dyn SshSession>, SshError> {
        let target = match port {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        self.script
            .record(format!("connect {} {}", target, user.unwrap_or_default()));
        Ok(Box::new(MockSession {
            script: self.script.clone(),
        }))
    }
}

struct MockSession {
    script: Arc<ConnectorScript>,
}

impl SshSession for MockSession {
    fn authenticate_public_key(&mut self, passphrase: Option<&str>) -> AuthStatus {
        match passphrase {
            None => {
                self.script.record("publickey".to_string());
                self.script.public_key
            }
            Some(passphrase) => {
                self.script.record(format!("publickey {}", passphrase));
                self.script.public_key_with_passphrase
            }
        }
    }

    fn authenticate_password(&mut self, password: &str) -> AuthStatus {
        self.script.record(format!("password {}", password));
        self.script.password
    }

    fn open_exec_channel(&mut self, command: &str) -> Result<Box<dyn SshChannel>, SshError> {
        self.script.record(format!("exec {}", command));
        Ok(Box::new(MockChannel::finished(
            &self.script.stdout,
            &self.script.stderr,
            Some(0),
        )))
    }

    fn disconnect(&mut self) {
        self.script.record("disconnect".to_string());
    }
}

/// Credentials callback that answers every password prompt with a fixed
/// secret, or refuses when it has none.
pub(crate) struct StaticProvider {
    secret: Option<String>,
    get_calls: Mutex<usize>,
    cache_calls: Mutex<usize>,
}

impl StaticProvider {
    pub(crate) fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.map(str::to_string),
            get_calls: Mutex::new(0),
            cache_calls: Mutex::new(0),
        }
    }

    pub(crate) fn get_calls(&self) -> usize {
        *self.get_calls.lock().unwrap()
    }

    pub(crate) fn cache_calls(&self) -> usize {
        *self.cache_calls.lock().unwrap()
    }
}

impl CredentialsProvider for StaticProvider {
    fn is_interactive(&self) -> bool {
        false
    }

    fn supports(&self, _items: &[CredentialItem]) -> bool {
        true
    }

    fn get(&self, _uri: &str, items: &mut [CredentialItem]) -> bool {
        *self.get_calls.lock().unwrap() += 1;
        match &self.secret {
            Some(secret) => items.iter_mut().all(|item| item.set_value(secret)),
            None => false,
        }
    }

    fn cache_credentials_if_needed(&self) {
        *self.cache_calls.lock().unwrap() += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NetworkCall {
    Batch {
        url: String,
        request: LfsBatchRequest,
        user: Option<String>,
    },
    Upload {
        href: String,
        oid: String,
        user: Option<String>,
    },
    Verify {
        href: String,
        oid: String,
        user: Option<String>,
    },
    Download {
        href: String,
        out_path: PathBuf,
        user: Option<String>,
    },
}

impl NetworkCall {
    pub(crate) fn user(&self) -> Option<String> {
        match self {
            NetworkCall::Batch { user, .. }
            | NetworkCall::Upload { user, .. }
            | NetworkCall::Verify { user, .. }
            | NetworkCall::Download { user, .. } => user.clone(),
        }
    }
}

/// LFS transport that records every request. Batch answers and transfer
/// results are queued by the test; an empty transfer queue means success.
#[derive(Default)]
pub(crate) struct MockNetwork {
    calls: Mutex<Vec<NetworkCall>>,
    batches: Mutex<VecDeque<Result<LfsBatchResponse, LfsError>>>,
    transfers: Mutex<VecDeque<Result<(), LfsError>>>,
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_batch(&self, result: Result<LfsBatchResponse, LfsError>) {
        self.batches.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_transfer(&self, result: Result<(), LfsError>) {
        self.transfers.lock().unwrap().push_back(result);
    }

    pub(crate) fn calls(&self) -> Vec<NetworkCall> {
        self.calls.lock().unwrap().clone()
    }

    fn transfer(&self, call: NetworkCall) -> Result<(), LfsError> {
        self.calls.lock().unwrap().push(call);
        self.transfers.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl LfsNetwork for MockNetwork {
    async fn post_batch_objects(
        &self,
        lfs_server_url: &str,
        request: &LfsBatchRequest,
        _headers: &HashMap<String, String>,
        user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<LfsBatchResponse, LfsError> {
        self.calls.lock().unwrap().push(NetworkCall::Batch {
            url: lfs_server_url.to_string(),
            request: request.clone(),
            user: user.map(str::to_string),
        });
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LfsError::Protocol("unexpected batch request".into())))
    }

    async fn upload_object(
        &self,
        href: &str,
        oid: &str,
        _path: &Path,
        _size: u64,
        _headers: &HashMap<String, String>,
        user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), LfsError> {
        self.transfer(NetworkCall::Upload {
            href: href.to_string(),
            oid: oid.to_string(),
            user: user.map(str::to_string),
        })
    }

    async fn verify(
        &self,
        href: &str,
        oid: &str,
        _size: u64,
        _headers: &HashMap<String, String>,
        user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), LfsError> {
        self.transfer(NetworkCall::Verify {
            href: href.to_string(),
            oid: oid.to_string(),
            user: user.map(str::to_string),
        })
    }

    async fn download_object(
        &self,
        href: &str,
        out_path: &Path,
        _headers: &HashMap<String, String>,
        user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), LfsError> {
        self.transfer(NetworkCall::Download {
            href: href.to_string(),
            out_path: out_path.to_path_buf(),
            user: user.map(str::to_string),
        })
    }
}
