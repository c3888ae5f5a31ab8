//! Entity handle
//!
//! An [`Entity`] is a cheap, clonable handle to one identified record of a
//! document. Clones share identity: two handles are equal only if they point to
//! the same entity object. The state payload is swapped wholesale on every
//! change; `None` marks an entity that was never initialized or was destroyed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::document::{Document, DocumentInner};
use crate::errors::{DocError, Result};
use crate::model::{EntityId, EntityState};
use crate::registry::{AsAny, EntityBehavior};

pub struct Entity<S: EntityState> {
    inner: Rc<EntityInner<S>>,
}

struct EntityInner<S: EntityState> {
    id: EntityId,
    type_tag: String,
    /// Navigation only; the document owns its entities, never the reverse
    doc: Weak<DocumentInner<S>>,
    state: RefCell<Option<Rc<S>>>,
    behavior: Box<dyn EntityBehavior<S>>,
}

impl<S: EntityState> Entity<S> {
    pub(crate) fn new(
        id: EntityId,
        type_tag: impl Into<String>,
        doc: Weak<DocumentInner<S>>,
        behavior: Box<dyn EntityBehavior<S>>,
    ) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                id,
                type_tag: type_tag.into(),
                doc,
                state: RefCell::new(None),
                behavior,
            }),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    /// The immutable type tag chosen at construction
    pub fn type_tag(&self) -> &str {
        &self.inner.type_tag
    }

    /// The owning document, if it is still open
    pub fn document(&self) -> Option<Document<S>> {
        self.inner.doc.upgrade().map(Document::from_inner)
    }

    /// Current state, or `None` if uninitialized or destroyed
    pub fn state(&self) -> Option<Rc<S>> {
        self.inner.state.borrow().clone()
    }

    pub fn has_state(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// The behavior object built by the registry for this entity's type
    pub fn behavior(&self) -> &dyn EntityBehavior<S> {
        self.inner.behavior.as_ref()
    }

    /// Downcast the behavior object to its concrete type
    pub fn behavior_as<T: Any>(&self) -> Option<&T> {
        <dyn EntityBehavior<S> as AsAny>::as_any(self.inner.behavior.as_ref()).downcast_ref::<T>()
    }

    /// Apply `update` to a copy of the current state and publish the copy
    ///
    /// The previous state value is left untouched, so requests and callers
    /// holding it keep seeing it. `update` must be deterministic and free of
    /// side effects beyond editing the draft.
    ///
    /// # Errors
    ///
    /// * `EntityHasNoState` - the entity is uninitialized or destroyed
    /// * `DocumentClosed` - the owning document has been dropped
    /// * `NoActiveTransaction` - the owning document has no open transaction
    pub fn modify<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut S),
    {
        let before = self.state().ok_or_else(|| DocError::EntityHasNoState {
            entity_id: self.id().to_string(),
        })?;
        let doc = self.owning_document()?;
        doc.save_before_change_state(self, Some(before.clone()), "modify")?;

        let mut draft = S::clone(&before);
        update(&mut draft);
        self.swap_state(Some(Rc::new(draft)));
        Ok(())
    }

    /// Give a freshly created entity its first state
    ///
    /// # Errors
    ///
    /// * `StateAlreadyInitialized` - the entity already has state
    /// * `DocumentClosed` - the owning document has been dropped
    /// * `NoActiveTransaction` - the owning document has no open transaction
    pub fn initialize(&self, state: S) -> Result<()> {
        if self.has_state() {
            return Err(DocError::StateAlreadyInitialized {
                entity_id: self.id().to_string(),
            });
        }
        let doc = self.owning_document()?;
        doc.save_before_change_state(self, None, "initialize")?;
        self.swap_state(Some(Rc::new(state)));
        Ok(())
    }

    /// Clear the entity's state inside the active transaction
    ///
    /// Pair this with [`Document::destroy_entity`] in the same transaction:
    /// this call records the state for undo, the document call removes the id
    /// from the mapping.
    ///
    /// # Errors
    ///
    /// * `DocumentClosed` - the owning document has been dropped
    /// * `NoActiveTransaction` - the owning document has no open transaction
    pub fn destroy(&self) -> Result<()> {
        let doc = self.owning_document()?;
        doc.save_before_change_state(self, self.state(), "destroy")?;
        self.swap_state(None);
        Ok(())
    }

    /// Low-level state setter for rollback, undo, redo and load
    ///
    /// Does nothing when `state` is the very value already held.
    pub fn restore_state(&self, state: Option<Rc<S>>) {
        if same_state(self.inner.state.borrow().as_ref(), state.as_ref()) {
            return;
        }
        self.swap_state(state);
    }

    fn swap_state(&self, next: Option<Rc<S>>) {
        let before = self.inner.state.replace(next.clone());
        self.inner
            .behavior
            .on_state_changed(self, before.as_deref(), next.as_deref());
    }

    fn owning_document(&self) -> Result<Rc<DocumentInner<S>>> {
        self.inner
            .doc
            .upgrade()
            .ok_or_else(|| DocError::DocumentClosed {
                entity_id: self.id().to_string(),
            })
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: EntityState> Clone for Entity<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: EntityState> PartialEq for Entity<S> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<S: EntityState> Eq for Entity<S> {}

impl<S: EntityState> fmt::Debug for Entity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.inner.id)
            .field("type_tag", &self.inner.type_tag)
            .field("has_state", &self.has_state())
            .finish()
    }
}

/// Reference-identity comparison of two optional state values
pub(crate) fn same_state<S>(a: Option<&Rc<S>>, b: Option<&Rc<S>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
