//! Transactions
//!
//! A [`Transaction`] is the only window in which a document's entities may
//! change. The document keeps the transaction's log: the mapping captured at
//! start and the first-seen state of every entity touched. On `commit` the log
//! becomes a [`Request`]; on `rollback` it is replayed backwards.

use std::collections::BTreeMap;
use std::rc::Rc;

use vedoc_core_types::TransactionId;

use crate::document::Document;
use crate::entity::{same_state, Entity};
use crate::errors::Result;
use crate::model::{EntityId, EntityState, Snapshot};
use crate::request::{Request, StateChange};

/// Per-transaction record held by the document while the transaction is open
pub(crate) struct TransactionLog<S: EntityState> {
    id: TransactionId,
    before_entities: Snapshot<S>,
    before_states: BTreeMap<EntityId, (Entity<S>, Option<Rc<S>>)>,
    recording: bool,
}

impl<S: EntityState> TransactionLog<S> {
    pub(crate) fn recording(before_entities: Snapshot<S>) -> Self {
        Self {
            id: TransactionId::new(),
            before_entities,
            before_states: BTreeMap::new(),
            recording: true,
        }
    }

    /// Log for document initialization; remembers nothing
    pub(crate) fn untracked(before_entities: Snapshot<S>) -> Self {
        Self {
            recording: false,
            ..Self::recording(before_entities)
        }
    }

    pub(crate) fn id(&self) -> &TransactionId {
        &self.id
    }

    pub(crate) fn save_before_change_state(&mut self, entity: &Entity<S>, state: Option<Rc<S>>) {
        if !self.recording {
            return;
        }
        self.before_states
            .entry(entity.id())
            .or_insert_with(|| (entity.clone(), state));
    }
}

/// An open transaction on a document
///
/// Ends with [`commit`](Self::commit) or [`rollback`](Self::rollback). A
/// transaction dropped without either is rolled back.
#[must_use = "a transaction is rolled back when dropped without commit"]
pub struct Transaction<S: EntityState> {
    doc: Document<S>,
    id: TransactionId,
    finished: bool,
}

impl<S: EntityState> Transaction<S> {
    pub(crate) fn new(doc: Document<S>, id: TransactionId) -> Self {
        Self {
            doc,
            id,
            finished: false,
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn document(&self) -> &Document<S> {
        &self.doc
    }

    /// Record the before-state of `entity`; later calls for the same entity
    /// are ignored
    ///
    /// Entity mutation paths call this automatically.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if the transaction has already ended.
    pub fn save_before_change_state(&self, entity: &Entity<S>, state: Option<Rc<S>>) -> Result<()> {
        self.doc
            .inner()
            .save_before_change_state(entity, state, "save_before_change_state")
    }

    /// End the transaction, producing a request if anything changed
    ///
    /// Returns `None` when no entity was touched and the mapping is the same
    /// value as at start. Per-entity changes are kept for entities whose final
    /// state is a different value and that either had state before the
    /// transaction or were already mapped then (an entity created earlier and
    /// initialized now). Entities born in this transaction are covered by the
    /// mapping snapshots alone.
    pub fn commit(mut self) -> Option<Request<S>> {
        self.finished = true;
        let log = self.doc.inner().finish()?;
        let after_entities = self.doc.snapshot();

        if log.before_states.is_empty() && log.before_entities.ptr_eq(&after_entities) {
            tracing::debug!(transaction_id = %self.id, "commit: empty transaction, no request");
            return None;
        }

        let changes: BTreeMap<EntityId, StateChange<S>> = log
            .before_states
            .into_iter()
            .filter_map(|(id, (entity, before))| {
                if before.is_none() && !log.before_entities.contains_key(&id) {
                    return None;
                }
                let after = entity.state();
                if same_state(before.as_ref(), after.as_ref()) {
                    return None;
                }
                Some((id, StateChange::new(entity, before, after)))
            })
            .collect();

        tracing::debug!(
            transaction_id = %self.id,
            changed_len = changes.len(),
            "transaction committed"
        );
        Some(Request::new(
            self.doc.clone(),
            self.id.clone(),
            changes,
            log.before_entities,
            after_entities,
        ))
    }

    /// End the transaction, restoring the start mapping and every touched
    /// entity's before-state
    pub fn rollback(mut self) {
        self.finished = true;
        self.rollback_inner();
    }

    fn rollback_inner(&self) {
        let Some(log) = self.doc.inner().finish() else {
            return;
        };
        self.doc.restore(log.before_entities);
        let restored = log.before_states.len();
        for (entity, before) in log.before_states.into_values() {
            entity.restore_state(before);
        }
        tracing::debug!(transaction_id = %self.id, restored, "transaction rolled back");
    }
}

impl<S: EntityState> Drop for Transaction<S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                transaction_id = %self.id,
                "transaction dropped without commit or rollback; rolling back"
            );
            self.rollback_inner();
        }
    }
}
