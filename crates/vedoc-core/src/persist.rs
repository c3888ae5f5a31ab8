//! Document load/save
//!
//! The serialized form is a flat list of `{ id, type, state }` triples:
//!
//! ```json
//! { "entities": [ { "id": "1", "type": "wall", "state": { "len": 3 } } ] }
//! ```
//!
//! Loading is lenient: an entry with an unregistered type, an unparsable id or
//! an id with no successor (`u64::MAX`) is skipped with a warning and the rest
//! of the document still loads. The id generator is advanced past the ids of
//! the entities actually constructed.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::entity::Entity;
use crate::errors::{DocError, Result};
use crate::model::{EntityId, EntityState, Snapshot};

/// One serialized entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDump<S> {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub state: Option<S>,
}

/// Serialized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDump<S> {
    pub entities: Vec<EntityDump<S>>,
}

impl<S: EntityState> Document<S> {
    /// Dump every entity in id order
    pub fn to_dump(&self) -> DocumentDump<S> {
        let entities = self
            .entities()
            .into_iter()
            .map(|entity| EntityDump {
                id: entity.id().to_string(),
                type_tag: entity.type_tag().to_string(),
                state: entity.state().map(|s| S::clone(&s)),
            })
            .collect();
        DocumentDump { entities }
    }

    /// # Errors
    ///
    /// Returns `Serialization` if a state value cannot be serialized.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_dump())?)
    }

    /// # Errors
    ///
    /// Returns `Serialization` if a state value cannot be serialized.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_dump())?)
    }

    /// Replace the document's contents with `dump`
    ///
    /// Returns the number of entities constructed. No history is produced.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if a transaction is open.
    pub fn load_dump(&self, dump: DocumentDump<S>) -> Result<usize> {
        if self.has_active_transaction() {
            return Err(DocError::TransactionInProgress { op: "load" });
        }

        let inner = self.inner();
        let mut entities = Snapshot::new();
        for EntityDump {
            id,
            type_tag,
            state,
        } in dump.entities
        {
            let entity_id = match id.parse::<EntityId>() {
                Ok(entity_id) => entity_id,
                Err(err) => {
                    tracing::warn!(entity_type = %type_tag, error = %err, "load: skipping entity");
                    continue;
                }
            };
            let Some(behavior) = inner.registry.create(&type_tag) else {
                tracing::warn!(
                    entity_id = %entity_id,
                    entity_type = %type_tag,
                    "load: skipping entity of unknown type"
                );
                continue;
            };

            if let Err(err) = inner.ids.sync(entity_id) {
                tracing::warn!(entity_type = %type_tag, error = %err, "load: skipping entity");
                continue;
            }
            let entity = Entity::new(entity_id, type_tag, Rc::downgrade(inner), behavior);
            entity.restore_state(state.map(Rc::new));
            entities.insert(entity_id, entity);
        }

        let loaded = entities.len();
        self.restore(entities);
        tracing::debug!(loaded, "document loaded");
        Ok(loaded)
    }

    /// # Errors
    ///
    /// Returns `Serialization` if `value` is not a document dump, or
    /// `TransactionInProgress` if a transaction is open.
    pub fn load_json(&self, value: serde_json::Value) -> Result<usize> {
        let dump: DocumentDump<S> = serde_json::from_value(value)?;
        self.load_dump(dump)
    }

    /// # Errors
    ///
    /// Returns `Serialization` if `json` is not a document dump, or
    /// `TransactionInProgress` if a transaction is open.
    pub fn load_json_str(&self, json: &str) -> Result<usize> {
        let dump: DocumentDump<S> = serde_json::from_str(json)?;
        self.load_dump(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntityRegistry;

    fn registry() -> EntityRegistry<u32> {
        EntityRegistry::new().with_plain("wall").with_plain("slab")
    }

    #[test]
    fn test_dump_is_id_ordered_triples() {
        let doc = Document::new(registry());
        doc.run_untracked(|doc| {
            doc.create_entity_with_state("wall", 10)?;
            doc.create_entity_with_state("slab", 20)?;
            Ok(())
        })
        .unwrap();

        let json = doc.to_json().unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entities": [
                    { "id": "1", "type": "wall", "state": 10 },
                    { "id": "2", "type": "slab", "state": 20 }
                ]
            })
        );
    }

    #[test]
    fn test_load_skips_bad_ids() {
        let doc = Document::new(registry());
        let loaded = doc
            .load_json(serde_json::json!({
                "entities": [
                    { "id": "x", "type": "wall", "state": 1 },
                    { "id": "4", "type": "wall", "state": 2 }
                ]
            }))
            .unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_load_rejected_during_transaction() {
        let doc = Document::new(registry());
        let _txn = doc.start_transaction().unwrap();
        let result = doc.load_json_str(r#"{ "entities": [] }"#);
        assert!(matches!(
            result,
            Err(DocError::TransactionInProgress { op: "load" })
        ));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let doc = Document::new(registry());
        assert!(matches!(
            doc.load_json_str("{ not json"),
            Err(DocError::Serialization { .. })
        ));
    }
}
