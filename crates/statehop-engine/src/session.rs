//! Per-user session lifecycle
//!
//! ```text
//! Joining ──load ok──▶ Active ──disconnect──▶ Leaving
//!    │                   ▲
//!    └──load failed──▶ Locked ──retry ok──┘
//! ```
//!
//! A `Locked` session is read-only: nothing is saved for it, so live state
//! that never got loaded cannot overwrite good stored data.

use statehop_core::errors::SyncError;
use statehop_core::DataOwner;
use statehop_core_types::{SnapshotId, UserId};
use std::sync::{Arc, Mutex};

/// A live data owner shared between the engine and the host
pub type SharedOwner = Arc<Mutex<dyn DataOwner>>;

#[derive(Debug, Clone)]
pub enum SessionState {
    Joining,
    Active,
    /// Load failed; carries the recoverable error
    Locked(SyncError),
    Leaving,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, SessionState::Locked(_))
    }

    pub fn lock_error(&self) -> Option<&SyncError> {
        match self {
            SessionState::Locked(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Locked(_) => "locked",
            SessionState::Leaving => "leaving",
        }
    }
}

/// Where a session's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Handoff,
    Store,
    /// Nothing stored anywhere; the user starts with live defaults
    Fresh,
}

#[derive(Clone)]
pub struct Session {
    user_id: UserId,
    username: String,
    owner: SharedOwner,
    state: SessionState,
    loaded_from: Option<LoadSource>,
    /// Marker consumed on join, remembered so a retry keeps the same
    /// expectation of which snapshot is current
    expected_snapshot: Option<SnapshotId>,
}

impl Session {
    pub(crate) fn joining(user_id: UserId, username: &str, owner: SharedOwner) -> Self {
        Self {
            user_id,
            username: username.to_string(),
            owner,
            state: SessionState::Joining,
            loaded_from: None,
            expected_snapshot: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn owner(&self) -> &SharedOwner {
        &self.owner
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn loaded_from(&self) -> Option<LoadSource> {
        self.loaded_from
    }

    pub fn expected_snapshot(&self) -> Option<SnapshotId> {
        self.expected_snapshot
    }

    pub(crate) fn set_expected_snapshot(&mut self, id: Option<SnapshotId>) {
        self.expected_snapshot = id;
    }

    pub(crate) fn activate(&mut self, source: LoadSource) {
        self.state = SessionState::Active;
        self.loaded_from = Some(source);
        self.expected_snapshot = None;
    }

    pub(crate) fn lock(&mut self, err: SyncError) {
        self.state = SessionState::Locked(err);
        self.loaded_from = None;
    }

    pub(crate) fn leave(&mut self) {
        self.state = SessionState::Leaving;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("state", &self.state)
            .field("loaded_from", &self.loaded_from)
            .field("expected_snapshot", &self.expected_snapshot)
            .finish_non_exhaustive()
    }
}
