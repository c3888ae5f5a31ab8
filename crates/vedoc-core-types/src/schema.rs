//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names consistent between the logging macros,
//! the engine's diagnostics and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Correlation
pub const FIELD_TRANSACTION_ID: &str = "transaction_id";
pub const FIELD_SESSION_ID: &str = "session_id";

// Entity identifiers
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_ENTITY_TYPE: &str = "entity_type";

// Collection sizes
pub const FIELD_CHANGED_LEN: &str = "changed_len";
pub const FIELD_REQUEST_LEN: &str = "request_len";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
