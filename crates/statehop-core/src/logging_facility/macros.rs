//! Canonical logging macros
//!
//! Every pipeline stage brackets its work with a start event and exactly one
//! end or end_error event carrying the elapsed time.

/// Log the start of an operation
///
/// ```
/// # use statehop_core::log_op_start;
/// log_op_start!("join");
/// log_op_start!("join", user_id = %"7a1f2a2e");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use statehop_core::log_op_end;
/// log_op_end!("join", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// Accepts anything convertible into `SyncError` and records its kind and
/// stable code.
///
/// ```
/// # use statehop_core::{log_op_error, errors::SnapshotError};
/// let err = SnapshotError::NoLegacyConverter { format_version: 2 };
/// log_op_error!("deserialize", err, duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let sync_err: $crate::errors::SyncError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?sync_err.kind(),
            err.code = sync_err.code(),
            error = %sync_err,
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let sync_err: $crate::errors::SyncError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?sync_err.kind(),
            err.code = sync_err.code(),
            error = %sync_err,
            $($field)*
        );
    }};
}
