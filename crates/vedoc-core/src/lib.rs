//! vedoc Core - transactional, versioned entity-document engine
//!
//! This crate provides:
//! - Documents holding a persistent (structurally shared) id → entity mapping
//! - Entities with an opaque, immutable state value swapped on every change
//! - Transactions as the only window for mutation, one per document
//! - Requests: reversible change records supporting undo, redo and merge
//! - Undo/redo sessions, nestable and mergeable, via `UndoRedoManager`
//! - Lenient load/save of `{ id, type, state }` triples
//!
//! ```
//! use vedoc_core::{Document, EntityRegistry, UndoRedoManager};
//!
//! let doc: Document<u32> = Document::new(EntityRegistry::new().with_plain("wall"));
//! let mut history = UndoRedoManager::new();
//!
//! let txn = doc.start_transaction().unwrap();
//! let wall = doc.create_entity_with_state("wall", 3).unwrap().unwrap();
//! history.commit(txn.commit().unwrap());
//!
//! let txn = doc.start_transaction().unwrap();
//! wall.modify(|len| *len = 4).unwrap();
//! history.commit(txn.commit().unwrap());
//!
//! history.undo().unwrap();
//! assert_eq!(wall.state().as_deref(), Some(&3));
//! ```
//!
//! Everything here is single-threaded (`Rc`/`RefCell`).

pub mod document;
pub mod entity;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod persist;
pub mod registry;
pub mod request;
pub mod transaction;
pub mod undo;

#[doc(hidden)]
pub use tracing;
#[doc(hidden)]
pub use vedoc_core_types;

// Re-export commonly used types
pub use document::Document;
pub use entity::Entity;
pub use errors::{DocError, ExError, ExErrorKind, Result};
pub use model::{EntityId, EntityState, IdGenerator, Snapshot};
pub use persist::{DocumentDump, EntityDump};
pub use registry::{EntityBehavior, EntityRegistry, PlainEntity};
pub use request::{Request, StateChange};
pub use transaction::Transaction;
pub use undo::{UndoRedoManager, UndoRedoSession};
pub use vedoc_core_types::{SessionId, TransactionId};
