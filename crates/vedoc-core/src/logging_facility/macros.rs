//! Canonical logging macros
//!
//! Every event carries `component`, `op` and `event` so that start/end pairs
//! can be matched up by log tooling and by the test capture layer.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use vedoc_core::log_op_start;
/// log_op_start!("commit_session");
/// log_op_start!("commit_session", session_id = "s1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use vedoc_core::log_op_end;
/// log_op_end!("commit_session", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// The error is converted into an `ExError` so the event carries the stable
/// error kind and code.
///
/// # Example
///
/// ```
/// # use vedoc_core::{log_op_error, errors::DocError};
/// let err = DocError::MixedDocuments;
/// log_op_error!("commit_session", err, duration_ms = 1);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::vedoc_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            $($field)*
        );
    }};
}
