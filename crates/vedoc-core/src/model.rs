//! Identifiers, state payloads and document snapshots

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::errors::DocError;

/// Identifier of an entity within its document
///
/// Displayed and serialized as a decimal string (`"1"`, `"2"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(EntityId)
            .map_err(|_| DocError::InvalidEntityId {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for EntityId {
    type Error = DocError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// Monotonic entity id generator
///
/// Starts at 1. `sync` only ever moves the generator forward, so ids handed
/// out after a load never collide with loaded ones.
#[derive(Debug)]
pub struct IdGenerator {
    next: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Cell::new(start.max(1)),
        }
    }

    /// Allocate the next id
    ///
    /// # Errors
    ///
    /// Returns `IdsExhausted` once `u64::MAX` is reached; that value is never
    /// handed out.
    pub fn generate(&self) -> Result<EntityId, DocError> {
        let id = self.next.get();
        let following = id.checked_add(1).ok_or(DocError::IdsExhausted)?;
        self.next.set(following);
        Ok(EntityId(id))
    }

    /// Advance past `seen` if it is not already behind the generator
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityId` for `u64::MAX`, which has no successor. The
    /// generator is left unchanged.
    pub fn sync(&self, seen: EntityId) -> Result<(), DocError> {
        let following = seen
            .0
            .checked_add(1)
            .ok_or_else(|| DocError::InvalidEntityId {
                value: seen.to_string(),
            })?;
        if following > self.next.get() {
            self.next.set(following);
        }
        Ok(())
    }

    /// The id the next call to `generate` will return
    pub fn peek(&self) -> EntityId {
        EntityId(self.next.get())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker trait for a document's entity state payload
///
/// State values are immutable once published: each mutation produces a new
/// value (held behind an `Rc`) and the previous value stays valid for every
/// request or caller still holding it.
pub trait EntityState: Clone + Serialize + DeserializeOwned + 'static {}

impl<T> EntityState for T where T: Clone + Serialize + DeserializeOwned + 'static {}

/// Persistent mapping from entity id to entity
///
/// Cloning is O(1) and every insert/remove yields a new value that shares
/// structure with the old one, so a transaction or request can keep the
/// mapping of any point in time around for the cost of a pointer.
pub type Snapshot<S> = im::HashMap<EntityId, Entity<S>>;
