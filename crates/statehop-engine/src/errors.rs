//! Error helpers for the engine

use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core_types::UserId;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SyncError>;

pub fn internal(op: &str, message: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorKind::Internal)
        .with_op(op)
        .with_message(message)
}

pub fn no_session(op: &str, user_id: UserId) -> SyncError {
    SyncError::new(SyncErrorKind::NotFound)
        .with_op(op)
        .with_user_id(user_id)
        .with_message("user has no session on this server")
}

pub fn session_locked(op: &str, user_id: UserId, cause: &SyncError) -> SyncError {
    SyncError::new(SyncErrorKind::SessionLocked)
        .with_op(op)
        .with_user_id(user_id)
        .with_message("session is locked; data was not loaded")
        .with_source(cause.clone())
}

pub fn handoff_timeout(user_id: UserId, waited: Duration) -> SyncError {
    SyncError::new(SyncErrorKind::Timeout)
        .with_op("join")
        .with_user_id(user_id)
        .with_message(format!(
            "handoff data did not arrive within {} ms and the store holds an older snapshot",
            waited.as_millis()
        ))
}

pub fn join_failed(user_id: UserId, err: SyncError) -> SyncError {
    SyncError::new(SyncErrorKind::Persistence)
        .with_op("join")
        .with_user_id(user_id)
        .with_message("neither the handoff relay nor the store could be read")
        .with_source(err)
}

/// Failure of a spawned blocking call
pub fn task_failed(op: &str, err: tokio::task::JoinError) -> SyncError {
    internal(op, format!("background task failed: {}", err))
}
