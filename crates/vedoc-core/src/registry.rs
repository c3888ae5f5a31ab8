//! Entity type registry
//!
//! Every entity carries an immutable type tag. The tag selects a factory in
//! the document's [`EntityRegistry`], which builds the [`EntityBehavior`] object
//! giving that type its polymorphic behavior (derived-view caches, invalidation
//! on state change). Tags the registry does not know are rejected softly:
//! creation returns `None` and loading skips the entry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::entity::Entity;
use crate::model::EntityState;

/// Object-safe access to `Any` for behavior downcasting
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-type behavior attached to every entity of that type
pub trait EntityBehavior<S: EntityState>: AsAny {
    /// Called after the entity's state has been swapped
    ///
    /// Fires for controlled mutations, destruction, and the low-level
    /// restores performed by rollback, undo, redo and load. Implementations
    /// drop whatever they derived from the old state; they must not mutate the
    /// document.
    fn on_state_changed(&self, _entity: &Entity<S>, _before: Option<&S>, _after: Option<&S>) {}
}

/// Behavior for types that derive nothing from their state
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainEntity;

impl<S: EntityState> EntityBehavior<S> for PlainEntity {}

/// Builds a fresh behavior object for a newly constructed entity
pub type EntityFactory<S> = Box<dyn Fn() -> Box<dyn EntityBehavior<S>>>;

/// Explicit mapping from type tag to entity factory
pub struct EntityRegistry<S: EntityState> {
    factories: HashMap<String, EntityFactory<S>>,
}

impl<S: EntityState> EntityRegistry<S> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for `tag`, replacing any previous one
    pub fn register<F, B>(&mut self, tag: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> B + 'static,
        B: EntityBehavior<S> + 'static,
    {
        self.factories.insert(
            tag.into(),
            Box::new(move || Box::new(factory()) as Box<dyn EntityBehavior<S>>),
        );
        self
    }

    /// Register `tag` with the no-op [`PlainEntity`] behavior
    pub fn register_plain(&mut self, tag: impl Into<String>) -> &mut Self {
        self.register(tag, || PlainEntity)
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with<F, B>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> B + 'static,
        B: EntityBehavior<S> + 'static,
    {
        self.register(tag, factory);
        self
    }

    /// Builder-style variant of [`register_plain`](Self::register_plain)
    pub fn with_plain(mut self, tag: impl Into<String>) -> Self {
        self.register_plain(tag);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build the behavior for `tag`, or `None` if the tag is unregistered
    pub fn create(&self, tag: &str) -> Option<Box<dyn EntityBehavior<S>>> {
        self.factories.get(tag).map(|factory| factory())
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl<S: EntityState> Default for EntityRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EntityState> fmt::Debug for EntityRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
