//! Core types shared across vedoc facilities
//!
//! This crate provides foundational types used by both the document engine
//! and its logging facility:
//!
//! - **Correlation types**: TransactionId, SessionId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{SessionId, TransactionId};
