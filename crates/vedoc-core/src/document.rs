//! Document: versioned entity mapping plus its single active transaction
//!
//! A [`Document`] owns a persistent [`Snapshot`] mapping entity ids to
//! entities. Every structural change (create, destroy) replaces the mapping
//! with a new value sharing structure with the old one, so a transaction or a
//! request can hold any earlier version and restore it with a pointer swap.
//!
//! At most one transaction is open per document. Creating, destroying and
//! mutating entities is only allowed while one is open.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::entity::Entity;
use crate::errors::{DocError, Result};
use crate::model::{EntityId, EntityState, IdGenerator, Snapshot};
use crate::registry::EntityRegistry;
use crate::transaction::{Transaction, TransactionLog};

pub(crate) struct DocumentInner<S: EntityState> {
    entities: RefCell<Snapshot<S>>,
    active: RefCell<Option<TransactionLog<S>>>,
    pub(crate) ids: IdGenerator,
    pub(crate) registry: Rc<EntityRegistry<S>>,
}

impl<S: EntityState> DocumentInner<S> {
    pub(crate) fn snapshot(&self) -> Snapshot<S> {
        self.entities.borrow().clone()
    }

    pub(crate) fn restore(&self, entities: Snapshot<S>) {
        *self.entities.borrow_mut() = entities;
    }

    pub(crate) fn has_active_transaction(&self) -> bool {
        self.active.borrow().is_some()
    }

    fn require_transaction(&self, op: &'static str) -> Result<()> {
        if self.has_active_transaction() {
            Ok(())
        } else {
            Err(DocError::NoActiveTransaction { op })
        }
    }

    /// Record `state` as the entity's before-state in the active transaction
    ///
    /// Only the first record per entity per transaction is kept.
    pub(crate) fn save_before_change_state(
        &self,
        entity: &Entity<S>,
        state: Option<Rc<S>>,
        op: &'static str,
    ) -> Result<()> {
        let mut active = self.active.borrow_mut();
        let log = active
            .as_mut()
            .ok_or(DocError::NoActiveTransaction { op })?;
        log.save_before_change_state(entity, state);
        Ok(())
    }

    pub(crate) fn begin(&self, log: TransactionLog<S>) -> bool {
        let mut active = self.active.borrow_mut();
        if active.is_some() {
            return false;
        }
        *active = Some(log);
        true
    }

    pub(crate) fn finish(&self) -> Option<TransactionLog<S>> {
        self.active.borrow_mut().take()
    }
}

/// Handle to a document
///
/// Clones share the same underlying document.
pub struct Document<S: EntityState> {
    inner: Rc<DocumentInner<S>>,
}

impl<S: EntityState> Document<S> {
    /// Open an empty document whose entity types come from `registry`
    pub fn new(registry: impl Into<Rc<EntityRegistry<S>>>) -> Self {
        Self {
            inner: Rc::new(DocumentInner {
                entities: RefCell::new(Snapshot::new()),
                active: RefCell::new(None),
                ids: IdGenerator::new(),
                registry: registry.into(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<DocumentInner<S>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<DocumentInner<S>> {
        &self.inner
    }

    pub fn registry(&self) -> &EntityRegistry<S> {
        &self.inner.registry
    }

    /// Whether both handles refer to the same document
    pub fn same_document(&self, other: &Document<S>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open a transaction, or `None` if one is already active
    ///
    /// A busy document is an expected condition, not a fault: callers branch
    /// on the result.
    pub fn start_transaction(&self) -> Option<Transaction<S>> {
        let log = TransactionLog::recording(self.snapshot());
        let id = log.id().clone();
        if !self.inner.begin(log) {
            tracing::debug!("start_transaction: document busy, another transaction is active");
            return None;
        }
        tracing::debug!(transaction_id = %id, "transaction started");
        Some(Transaction::new(self.clone(), id))
    }

    pub fn has_active_transaction(&self) -> bool {
        self.inner.has_active_transaction()
    }

    /// Run `f` with a non-recording transaction active
    ///
    /// Entities may be created and mutated inside `f` without producing
    /// history; this is how a default document is populated. Nothing is rolled
    /// back if `f` fails. The document is released even if `f` panics.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if a transaction is already active, or
    /// whatever `f` returns.
    pub fn run_untracked<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Document<S>) -> Result<R>,
    {
        if !self.inner.begin(TransactionLog::untracked(self.snapshot())) {
            return Err(DocError::TransactionInProgress { op: "run_untracked" });
        }
        let _release = UntrackedGuard(&self.inner);
        f(self)
    }

    /// Create an entity of type `type_tag` with no state yet
    ///
    /// Returns `Ok(None)` when the type is not registered; the mapping and the
    /// id generator are left untouched in that case.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if no transaction is open, or
    /// `IdsExhausted` if the id generator has run out.
    pub fn create_entity(&self, type_tag: &str) -> Result<Option<Entity<S>>> {
        self.inner.require_transaction("create_entity")?;

        let Some(behavior) = self.inner.registry.create(type_tag) else {
            tracing::debug!(entity_type = type_tag, "create_entity: unknown entity type");
            return Ok(None);
        };

        let id = self.inner.ids.generate()?;
        let entity = Entity::new(id, type_tag, Rc::downgrade(&self.inner), behavior);
        let next = self.snapshot().update(id, entity.clone());
        self.inner.restore(next);

        tracing::debug!(entity_id = %id, entity_type = type_tag, "entity created");
        Ok(Some(entity))
    }

    /// Create an entity and give it its first state in one step
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if no transaction is open.
    pub fn create_entity_with_state(&self, type_tag: &str, state: S) -> Result<Option<Entity<S>>> {
        match self.create_entity(type_tag)? {
            Some(entity) => {
                entity.initialize(state)?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Remove the entity's id from the mapping
    ///
    /// This does not record the entity's state; call [`Entity::destroy`] in
    /// the same transaction so the change is reversible. An id that is no
    /// longer mapped is left alone.
    ///
    /// # Errors
    ///
    /// * `NoActiveTransaction` - no transaction is open
    /// * `EntityNotInDocument` - the id maps to a different entity (a handle
    ///   from another document, or a stale one)
    pub fn destroy_entity(&self, entity: &Entity<S>) -> Result<()> {
        self.inner.require_transaction("destroy_entity")?;
        match self.inner.entities.borrow().get(&entity.id()) {
            None => {
                tracing::debug!(entity_id = %entity.id(), "destroy_entity: id not mapped");
                return Ok(());
            }
            Some(mapped) if !mapped.ptr_eq(entity) => {
                return Err(DocError::EntityNotInDocument {
                    entity_id: entity.id().to_string(),
                });
            }
            Some(_) => {}
        }
        let next = self.snapshot().without(&entity.id());
        self.inner.restore(next);
        tracing::debug!(entity_id = %entity.id(), "entity removed from mapping");
        Ok(())
    }

    /// The current mapping; O(1)
    pub fn snapshot(&self) -> Snapshot<S> {
        self.inner.snapshot()
    }

    /// Swap the current mapping for `entities`; O(1)
    ///
    /// Low-level: used by rollback, undo and redo. Entity states are not
    /// touched.
    pub fn restore(&self, entities: Snapshot<S>) {
        self.inner.restore(entities);
    }

    pub fn get_entity_by_id(&self, id: EntityId) -> Option<Entity<S>> {
        self.inner.entities.borrow().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entities.borrow().is_empty()
    }

    /// All entities in id order
    pub fn entities(&self) -> Vec<Entity<S>> {
        let mut entities: Vec<Entity<S>> = self.inner.entities.borrow().values().cloned().collect();
        entities.sort_by_key(Entity::id);
        entities
    }

    /// All entities of one type, in id order
    pub fn entities_of_type(&self, type_tag: &str) -> Vec<Entity<S>> {
        self.entities()
            .into_iter()
            .filter(|e| e.type_tag() == type_tag)
            .collect()
    }

    /// Resolve `ids` to entities of type `type_tag`
    ///
    /// Ids that are missing from the mapping or name an entity of another
    /// type are skipped.
    pub fn get_entities(&self, ids: &[EntityId], type_tag: &str) -> BTreeMap<EntityId, Entity<S>> {
        let entities = self.inner.entities.borrow();
        ids.iter()
            .filter_map(|id| entities.get(id))
            .filter(|e| e.type_tag() == type_tag)
            .map(|e| (e.id(), e.clone()))
            .collect()
    }
}

/// Clears the non-recording transaction when `run_untracked` unwinds or returns
struct UntrackedGuard<'a, S: EntityState>(&'a DocumentInner<S>);

impl<S: EntityState> Drop for UntrackedGuard<'_, S> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl<S: EntityState> Clone for Document<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: EntityState> fmt::Debug for Document<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("entities", &self.len())
            .field("next_id", &self.inner.ids.peek())
            .field("active_transaction", &self.has_active_transaction())
            .finish()
    }
}
