//! Request Tests
//!
//! ## Scenarios Covered
//!
//! 1. Undo/redo round trip of a single modification
//! 2. Undo and redo of creation and destruction through the mapping
//! 3. Initializing an entity created by an earlier transaction is reversible
//! 4. Merged request behaves like the sequence it replaces
//! 5. Undo/redo are refused while a transaction is open

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use vedoc_core::{DocError, Request};

#[test]
fn test_undo_redo_round_trip() {
    // GIVEN entity A with state 1
    let (doc, wall) = doc_with_wall(1);

    // WHEN a transaction sets A to 2 and commits
    let request = set_length(&doc, &wall, 2);
    assert_eq!(length_of(&wall), Some(2));

    // THEN undo gives 1 and redo gives 2 again
    request.undo().unwrap();
    assert_eq!(length_of(&wall), Some(1));
    request.redo().unwrap();
    assert_eq!(length_of(&wall), Some(2));
}

#[test]
fn test_undo_restores_identical_values() {
    let (doc, wall) = doc_with_wall(1);
    let before_state = wall.state().unwrap();
    let before_mapping = doc.snapshot();

    let request = set_length(&doc, &wall, 2);
    let after_state = wall.state().unwrap();
    let after_mapping = doc.snapshot();

    request.undo().unwrap();
    assert!(std::rc::Rc::ptr_eq(&wall.state().unwrap(), &before_state));
    assert!(doc.snapshot().ptr_eq(&before_mapping));

    request.redo().unwrap();
    assert!(std::rc::Rc::ptr_eq(&wall.state().unwrap(), &after_state));
    assert!(doc.snapshot().ptr_eq(&after_mapping));
}

#[test]
fn test_request_records_transaction_id() {
    let (doc, wall) = doc_with_wall(1);
    let txn = doc.start_transaction().unwrap();
    let id = txn.id().clone();
    wall.modify(|s| *s = PlanState::wall(2)).unwrap();
    let request = txn.commit().unwrap();

    assert_eq!(request.transaction_id(), &id);
    assert_eq!(request.changed_entities(), vec![wall.id()]);
    assert!(request.document().same_document(&doc));
}

#[test]
fn test_undo_of_creation_removes_entity() {
    let doc = new_doc();
    let txn = doc.start_transaction().unwrap();
    let slab = doc
        .create_entity_with_state(SLAB, PlanState::Slab { thickness: 1 })
        .unwrap()
        .unwrap();
    let request = txn.commit().unwrap();

    request.undo().unwrap();
    assert!(doc.get_entity_by_id(slab.id()).is_none());

    request.redo().unwrap();
    assert_eq!(doc.get_entity_by_id(slab.id()), Some(slab));
}

#[test]
fn test_initialize_in_later_transaction_is_undoable() {
    // GIVEN an entity created without state in one transaction
    let doc = new_doc();
    let txn = doc.start_transaction().unwrap();
    let wall = doc.create_entity(WALL).unwrap().unwrap();
    let created = txn.commit().unwrap();

    // WHEN a second transaction gives it its first state
    let txn = doc.start_transaction().unwrap();
    wall.initialize(PlanState::wall(6)).unwrap();
    let initialized = txn.commit().unwrap();

    // THEN the second request records the change from no state
    assert_eq!(initialized.changed_entities(), vec![wall.id()]);
    let change = initialized.state_change(wall.id()).unwrap();
    assert!(change.before().is_none());
    assert_eq!(change.after().map(|s| s.length()), Some(6));

    // AND undo takes the state away again while the entity stays mapped
    initialized.undo().unwrap();
    assert!(!wall.has_state());
    assert_eq!(doc.get_entity_by_id(wall.id()), Some(wall.clone()));

    // AND redo gives it back
    initialized.redo().unwrap();
    assert_eq!(length_of(&wall), Some(6));

    // AND undoing both leaves the document empty
    initialized.undo().unwrap();
    created.undo().unwrap();
    assert!(doc.is_empty());
}

#[test]
fn test_destroy_undo_redo() {
    // GIVEN entity E with state 4
    let (doc, wall) = doc_with_wall(4);

    // WHEN E is destroyed in a transaction
    let txn = doc.start_transaction().unwrap();
    wall.destroy().unwrap();
    doc.destroy_entity(&wall).unwrap();
    let request = txn.commit().unwrap();

    // THEN undo brings E back with its state
    request.undo().unwrap();
    assert_eq!(doc.get_entity_by_id(wall.id()), Some(wall.clone()));
    assert_eq!(length_of(&wall), Some(4));

    // AND redo removes it from the mapping again
    request.redo().unwrap();
    assert!(doc.get_entity_by_id(wall.id()).is_none());
}

#[test]
fn test_undo_refused_during_transaction() {
    let (doc, wall) = doc_with_wall(1);
    let request = set_length(&doc, &wall, 2);

    let txn = doc.start_transaction().unwrap();
    assert!(matches!(
        request.undo(),
        Err(DocError::TransactionInProgress { op: "undo" })
    ));
    assert!(matches!(
        request.redo(),
        Err(DocError::TransactionInProgress { op: "redo" })
    ));
    txn.rollback();

    assert_eq!(length_of(&wall), Some(2));
}

#[test]
fn test_merge_of_nothing_is_none() {
    let merged: Option<Request<PlanState>> = Request::merge(&[]).unwrap();
    assert!(merged.is_none());
}

#[test]
fn test_merge_of_one_is_itself() {
    let (doc, wall) = doc_with_wall(1);
    let request = set_length(&doc, &wall, 2);

    let merged = Request::merge(std::slice::from_ref(&request)).unwrap().unwrap();

    assert_eq!(merged.transaction_id(), request.transaction_id());
}

#[test]
fn test_merged_undo_equals_sequential_undo() {
    // GIVEN A=1 and B=1
    let (doc, a) = doc_with_wall(1);
    let b = doc
        .run_untracked(|doc| doc.create_entity_with_state(WALL, PlanState::wall(1)))
        .unwrap()
        .unwrap();
    let start = doc.snapshot();

    // WHEN three transactions set A=2, B=3, A=4 and are merged
    let requests = vec![
        set_length(&doc, &a, 2),
        set_length(&doc, &b, 3),
        set_length(&doc, &a, 4),
    ];
    let merged = Request::merge(&requests).unwrap().unwrap();

    // THEN the merged change keeps the earliest before and the latest after
    let change = merged.state_change(a.id()).unwrap();
    assert_eq!(change.before().map(|s| s.length()), Some(1));
    assert_eq!(change.after().map(|s| s.length()), Some(4));

    // AND undoing it lands where sequential undo would
    merged.undo().unwrap();
    assert_eq!(length_of(&a), Some(1));
    assert_eq!(length_of(&b), Some(1));
    assert!(doc.snapshot().ptr_eq(&start));

    // AND redo lands on the final state
    merged.redo().unwrap();
    assert_eq!(length_of(&a), Some(4));
    assert_eq!(length_of(&b), Some(3));
}

#[test]
fn test_merge_spans_creation_and_destruction() {
    let doc = new_doc();
    let mut requests = Vec::new();

    let txn = doc.start_transaction().unwrap();
    let wall = doc
        .create_entity_with_state(WALL, PlanState::wall(1))
        .unwrap()
        .unwrap();
    requests.push(txn.commit().unwrap());
    requests.push(set_length(&doc, &wall, 2));

    let merged = Request::merge(&requests).unwrap().unwrap();

    merged.undo().unwrap();
    assert!(doc.is_empty());
    merged.redo().unwrap();
    assert_eq!(doc.len(), 1);
    assert_eq!(length_of(&wall), Some(2));
}

#[test]
fn test_merge_across_documents_fails() {
    let (doc_a, wall_a) = doc_with_wall(1);
    let (doc_b, wall_b) = doc_with_wall(1);
    let requests = vec![set_length(&doc_a, &wall_a, 2), set_length(&doc_b, &wall_b, 2)];

    assert!(matches!(
        Request::merge(&requests),
        Err(DocError::MixedDocuments)
    ));
}
