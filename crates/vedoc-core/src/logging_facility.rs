//! Structured logging facility for vedoc
//!
//! This module provides:
//! - Single initialization point via `init(profile)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use vedoc_core::logging_facility::{init, Profile};
//!
//! // Initialize once at application startup
//! init(Profile::Development);
//! ```
//!
//! Host-facing boundaries (the undo manager) own the `log_op_*` start/end
//! pairs. Transactions, requests and document loading only emit
//! `tracing::debug!`/`tracing::warn!` details.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, EventQuery, TestCapture};
