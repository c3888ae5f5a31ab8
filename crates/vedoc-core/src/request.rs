//! Requests: immutable, replayable change records
//!
//! A [`Request`] is what a committed transaction leaves behind: the mapping
//! before and after, plus the before/after state of every entity whose state
//! changed. Replaying it backwards (`undo`) or forwards (`redo`) swaps the
//! mapping and restores the recorded states.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use vedoc_core_types::TransactionId;

use crate::document::Document;
use crate::entity::Entity;
use crate::errors::{DocError, Result};
use crate::model::{EntityId, EntityState, Snapshot};

/// Before/after state of one entity within a request
pub struct StateChange<S: EntityState> {
    entity: Entity<S>,
    before: Option<Rc<S>>,
    after: Option<Rc<S>>,
}

impl<S: EntityState> StateChange<S> {
    pub(crate) fn new(entity: Entity<S>, before: Option<Rc<S>>, after: Option<Rc<S>>) -> Self {
        Self {
            entity,
            before,
            after,
        }
    }

    pub fn entity(&self) -> &Entity<S> {
        &self.entity
    }

    /// `None` means the entity existed without state before the request
    pub fn before(&self) -> Option<&Rc<S>> {
        self.before.as_ref()
    }

    /// `None` means the entity was destroyed by the request
    pub fn after(&self) -> Option<&Rc<S>> {
        self.after.as_ref()
    }
}

impl<S: EntityState> Clone for StateChange<S> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

struct RequestInner<S: EntityState> {
    doc: Document<S>,
    transaction_id: TransactionId,
    changes: BTreeMap<EntityId, StateChange<S>>,
    before_entities: Snapshot<S>,
    after_entities: Snapshot<S>,
}

/// Immutable record of one reversible change to a document
///
/// Cloning is cheap; clones share the same record.
pub struct Request<S: EntityState> {
    inner: Rc<RequestInner<S>>,
}

impl<S: EntityState> Request<S> {
    pub(crate) fn new(
        doc: Document<S>,
        transaction_id: TransactionId,
        changes: BTreeMap<EntityId, StateChange<S>>,
        before_entities: Snapshot<S>,
        after_entities: Snapshot<S>,
    ) -> Self {
        Self {
            inner: Rc::new(RequestInner {
                doc,
                transaction_id,
                changes,
                before_entities,
                after_entities,
            }),
        }
    }

    pub fn document(&self) -> &Document<S> {
        &self.inner.doc
    }

    /// The transaction that produced this request; merged requests get a
    /// fresh id
    pub fn transaction_id(&self) -> &TransactionId {
        &self.inner.transaction_id
    }

    /// Ids of entities with a recorded state change, in id order
    pub fn changed_entities(&self) -> Vec<EntityId> {
        self.inner.changes.keys().copied().collect()
    }

    pub fn state_change(&self, id: EntityId) -> Option<&StateChange<S>> {
        self.inner.changes.get(&id)
    }

    pub fn before_snapshot(&self) -> &Snapshot<S> {
        &self.inner.before_entities
    }

    pub fn after_snapshot(&self) -> &Snapshot<S> {
        &self.inner.after_entities
    }

    /// Reapply the change: restore the after-mapping, then every recorded
    /// after-state that is not `None`
    ///
    /// Destroyed entities are handled by the mapping alone.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if the document has an open transaction.
    pub fn redo(&self) -> Result<()> {
        self.ensure_idle("redo")?;
        self.inner.doc.restore(self.inner.after_entities.clone());
        for change in self.inner.changes.values() {
            if let Some(after) = &change.after {
                change.entity.restore_state(Some(after.clone()));
            }
        }
        tracing::debug!(transaction_id = %self.inner.transaction_id, "request redone");
        Ok(())
    }

    /// Revert the change: restore the before-mapping, then every recorded
    /// before-state
    ///
    /// A `None` before-state belongs to an entity that was mapped but not yet
    /// initialized when the transaction started, and is restored as such.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if the document has an open transaction.
    pub fn undo(&self) -> Result<()> {
        self.ensure_idle("undo")?;
        self.inner.doc.restore(self.inner.before_entities.clone());
        for change in self.inner.changes.values() {
            change.entity.restore_state(change.before.clone());
        }
        tracing::debug!(transaction_id = %self.inner.transaction_id, "request undone");
        Ok(())
    }

    /// Fold an ordered sequence of requests into one
    ///
    /// The result spans the first request's before-mapping to the last
    /// request's after-mapping; per entity it keeps the earliest before-state
    /// and the latest after-state. Returns `None` for an empty sequence and
    /// the request itself for a single one.
    ///
    /// # Errors
    ///
    /// Returns `MixedDocuments` if the requests come from different documents.
    pub fn merge(requests: &[Request<S>]) -> Result<Option<Request<S>>> {
        let (first, last) = match requests {
            [] => return Ok(None),
            [only] => return Ok(Some(only.clone())),
            [first, .., last] => (first, last),
        };
        if requests
            .iter()
            .any(|r| !r.inner.doc.same_document(&first.inner.doc))
        {
            return Err(DocError::MixedDocuments);
        }

        let mut merged: BTreeMap<EntityId, StateChange<S>> = BTreeMap::new();
        for request in requests {
            for (id, change) in &request.inner.changes {
                merged
                    .entry(*id)
                    .and_modify(|m| m.after = change.after.clone())
                    .or_insert_with(|| change.clone());
            }
        }

        let request = Request::new(
            first.inner.doc.clone(),
            TransactionId::new(),
            merged,
            first.inner.before_entities.clone(),
            last.inner.after_entities.clone(),
        );
        tracing::debug!(
            transaction_id = %request.inner.transaction_id,
            request_len = requests.len(),
            "requests merged"
        );
        Ok(Some(request))
    }

    fn ensure_idle(&self, op: &'static str) -> Result<()> {
        if self.inner.doc.has_active_transaction() {
            return Err(DocError::TransactionInProgress { op });
        }
        Ok(())
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: EntityState> Clone for Request<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: EntityState> fmt::Debug for Request<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("transaction_id", &self.inner.transaction_id)
            .field("changed_entities", &self.changed_entities())
            .field("before_len", &self.inner.before_entities.len())
            .field("after_len", &self.inner.after_entities.len())
            .finish()
    }
}
