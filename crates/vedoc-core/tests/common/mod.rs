use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};
use vedoc_core::{Document, Entity, EntityBehavior, EntityId, EntityRegistry};

pub const WALL: &str = "wall";
pub const SLAB: &str = "slab";
pub const BUILDING: &str = "building";

/// State payload used by the test documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanState {
    Wall { length: u32, height: u32 },
    Slab { thickness: u32 },
    Building { walls: Vec<EntityId> },
}

impl PlanState {
    #[allow(dead_code)]
    pub fn wall(length: u32) -> Self {
        PlanState::Wall { length, height: 3 }
    }

    /// Length of a wall state; panics on other variants
    #[allow(dead_code)]
    pub fn length(&self) -> u32 {
        match self {
            PlanState::Wall { length, .. } => *length,
            other => panic!("not a wall: {:?}", other),
        }
    }
}

/// Building behavior with a derived view over its walls
///
/// The view is dropped every time the building's state changes.
#[derive(Default)]
pub struct BuildingBehavior {
    walls: RefCell<Option<Vec<EntityId>>>,
    pub invalidations: Cell<u32>,
    pub last_change: RefCell<Option<(Option<PlanState>, Option<PlanState>)>>,
}

impl BuildingBehavior {
    /// Walls of the building that are still in the document, cached until the
    /// next state change
    #[allow(dead_code)]
    pub fn walls(&self, building: &Entity<PlanState>) -> Vec<EntityId> {
        if let Some(cached) = self.walls.borrow().as_ref() {
            return cached.clone();
        }
        let ids = match building.state().as_deref() {
            Some(PlanState::Building { walls }) => walls.clone(),
            _ => Vec::new(),
        };
        let resolved: Vec<EntityId> = match building.document() {
            Some(doc) => doc.get_entities(&ids, WALL).into_keys().collect(),
            None => Vec::new(),
        };
        *self.walls.borrow_mut() = Some(resolved.clone());
        resolved
    }

    #[allow(dead_code)]
    pub fn is_cached(&self) -> bool {
        self.walls.borrow().is_some()
    }
}

impl EntityBehavior<PlanState> for BuildingBehavior {
    fn on_state_changed(
        &self,
        _entity: &Entity<PlanState>,
        before: Option<&PlanState>,
        after: Option<&PlanState>,
    ) {
        self.walls.borrow_mut().take();
        self.invalidations.set(self.invalidations.get() + 1);
        *self.last_change.borrow_mut() = Some((before.cloned(), after.cloned()));
    }
}

pub fn registry() -> EntityRegistry<PlanState> {
    EntityRegistry::new()
        .with_plain(WALL)
        .with_plain(SLAB)
        .with(BUILDING, BuildingBehavior::default)
}

#[allow(dead_code)]
pub fn new_doc() -> Document<PlanState> {
    Document::new(registry())
}

/// Document with one wall of the given length, created without history
#[allow(dead_code)]
pub fn doc_with_wall(length: u32) -> (Document<PlanState>, Entity<PlanState>) {
    let doc = new_doc();
    let wall = doc
        .run_untracked(|doc| doc.create_entity_with_state(WALL, PlanState::wall(length)))
        .unwrap()
        .unwrap();
    (doc, wall)
}

/// Set a wall's length in its own committed transaction
#[allow(dead_code)]
pub fn set_length(
    doc: &Document<PlanState>,
    wall: &Entity<PlanState>,
    length: u32,
) -> vedoc_core::Request<PlanState> {
    let txn = doc.start_transaction().unwrap();
    wall.modify(|s| {
        if let PlanState::Wall { length: l, .. } = s {
            *l = length;
        }
    })
    .unwrap();
    txn.commit().unwrap()
}

#[allow(dead_code)]
pub fn length_of(wall: &Entity<PlanState>) -> Option<u32> {
    wall.state().map(|s| s.length())
}
