//! The session record and its published snapshot.

use serde::Serialize;
use uuid::Uuid;

use crate::retry::RetryGuard;

/// Phase of the kiosk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingLogin,
    AwaitingPassword,
    Active,
}

/// Correlation id for one trip from AwaitingLogin back to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Mutable session record, owned by the state machine.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) state: SessionState,
    pub(crate) id: Option<SessionId>,
    pub(crate) user: Option<String>,
    pub(crate) balance: Option<String>,
    pub(crate) password_hash: Option<String>,
    /// TTL from the password challenge, applied on a match.
    pub(crate) pending_ttl: u32,
    pub(crate) attempts: RetryGuard,
    pub(crate) remaining_seconds: u32,
    pub(crate) purchase_log: Vec<String>,
    pub(crate) revision: u64,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Idle,
            id: None,
            user: None,
            balance: None,
            password_hash: None,
            pending_ttl: 0,
            attempts: RetryGuard::default(),
            remaining_seconds: 0,
            purchase_log: Vec::new(),
            revision: 0,
        }
    }

    /// Back to Idle with every per-user field cleared. The purchase log is
    /// only ever touched while Active, so it is left for the next login to
    /// clear and hidden from snapshots in the meantime.
    pub(crate) fn reset_to_idle(&mut self) {
        let purchase_log = std::mem::take(&mut self.purchase_log);
        let revision = self.revision;
        *self = Self::new();
        self.purchase_log = purchase_log;
        self.revision = revision;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.id,
            user: self.user.clone(),
            balance: self.balance.clone(),
            remaining_attempts: match self.state {
                SessionState::AwaitingPassword => Some(self.attempts.remaining()),
                _ => None,
            },
            remaining_seconds: match self.state {
                SessionState::Active => Some(self.remaining_seconds),
                _ => None,
            },
            purchase_log: match self.state {
                SessionState::Active => self.purchase_log.clone(),
                _ => Vec::new(),
            },
            revision: self.revision,
        }
    }
}

/// Immutable view of a committed session, handed to readers.
///
/// Never carries the challenge hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub user: Option<String>,
    pub balance: Option<String>,
    pub remaining_attempts: Option<u32>,
    pub remaining_seconds: Option<u32>,
    pub purchase_log: Vec<String>,
    /// Increments once per committed transition.
    pub revision: u64,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Session::new().snapshot()
    }
}
