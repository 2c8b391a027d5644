//! Negotiation slots keyed by repository session, so that two open
//! repositories can prompt independently of each other.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::state::{CredentialsKind, CredentialsState, CredentialsStateManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
pub struct CredentialsSessions {
    sessions: DashMap<SessionId, Arc<CredentialsStateManager>>,
}

impl CredentialsSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with an empty negotiation slot.
    pub fn open(&self) -> (SessionId, Arc<CredentialsStateManager>) {
        let id = SessionId::new();
        let manager = Arc::new(CredentialsStateManager::new());
        self.sessions.insert(id, manager.clone());
        tracing::debug!("Opened credentials session {}", id);
        (id, manager)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<CredentialsStateManager>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, id: SessionId) -> Arc<CredentialsStateManager> {
        self.sessions
            .entry(id)
            .or_insert_with(|| Arc::new(CredentialsStateManager::new()))
            .value()
            .clone()
    }

    /// Forget a session. A request still waiting in it is denied so its worker unwinds.
    pub fn close(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, manager)) => {
                if matches!(manager.current(), CredentialsState::Requested(_)) {
                    manager.deny();
                }
                tracing::debug!("Closed credentials session {}", id);
                true
            }
            None => false,
        }
    }

    /// Sessions that currently wait for the interactive layer.
    pub fn pending(&self) -> Vec<(SessionId, CredentialsKind)> {
        self.sessions
            .iter()
            .filter_map(|entry| match entry.value().current() {
                CredentialsState::Requested(kind) => Some((*entry.key(), kind)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
