//! Undo/redo sessions and the session manager
//!
//! ```text
//!  UndoRedoManager
//!  ┌──────────────────────────────────────────────┐
//!  │ nested: [ session A, session B ]  <- active  │
//!  │ default session (active when nested is empty)│
//!  └──────────────────────────────────────────────┘
//!
//!  commit_session(B, merge) : pop B, re-commit its requests into A
//!  abort_session(B)         : undo everything in B, pop B
//! ```
//!
//! The manager never references a document. Requests carry their own document
//! handle, so one manager can hold history for several documents as long as
//! the host routes their requests to it.

use std::time::Instant;

use vedoc_core_types::SessionId;

use crate::errors::Result;
use crate::model::EntityState;
use crate::request::Request;
use crate::{log_op_end, log_op_error, log_op_start};

/// Paired undo/redo stacks of committed requests
pub struct UndoRedoSession<S: EntityState> {
    undo_stack: Vec<Request<S>>,
    redo_stack: Vec<Request<S>>,
}

impl<S: EntityState> UndoRedoSession<S> {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Push a committed request onto the undo stack
    ///
    /// The redo stack is left as it is.
    pub fn commit(&mut self, request: Request<S>) {
        self.undo_stack.push(request);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Undo the most recent request; `Ok(false)` if there is nothing to undo
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if the request's document has an open
    /// transaction; the stacks are left unchanged.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(request) = self.undo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = request.undo() {
            self.undo_stack.push(request);
            return Err(err);
        }
        self.redo_stack.push(request);
        Ok(true)
    }

    /// Redo the most recently undone request; `Ok(false)` if there is none
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if the request's document has an open
    /// transaction; the stacks are left unchanged.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(request) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = request.redo() {
            self.redo_stack.push(request);
            return Err(err);
        }
        self.undo_stack.push(request);
        Ok(true)
    }

    /// The undo stack as requests to fold into a parent session
    ///
    /// With `merge`, the whole stack collapses into at most one request.
    ///
    /// # Errors
    ///
    /// Returns `MixedDocuments` when merging requests of different documents.
    pub fn to_requests(&self, merge: bool) -> Result<Vec<Request<S>>> {
        if merge {
            return Ok(Request::merge(&self.undo_stack)?.into_iter().collect());
        }
        Ok(self.undo_stack.clone())
    }
}

impl<S: EntityState> Default for UndoRedoSession<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Default session plus a LIFO stack of nested sessions
///
/// Only the top of the nested stack (or the default session when the stack
/// is empty) receives commits, undo and redo.
pub struct UndoRedoManager<S: EntityState> {
    default_session: UndoRedoSession<S>,
    nested: Vec<(SessionId, UndoRedoSession<S>)>,
}

impl<S: EntityState> UndoRedoManager<S> {
    pub fn new() -> Self {
        Self {
            default_session: UndoRedoSession::new(),
            nested: Vec::new(),
        }
    }

    /// Open a nested session on top of the active one
    pub fn start_session(&mut self) -> SessionId {
        let id = SessionId::new();
        self.nested.push((id.clone(), UndoRedoSession::new()));
        tracing::debug!(session_id = %id, depth = self.nested.len(), "session started");
        id
    }

    /// Id of the active nested session, `None` when the default session is active
    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.nested.last().map(|(id, _)| id)
    }

    /// Number of open nested sessions
    pub fn session_depth(&self) -> usize {
        self.nested.len()
    }

    fn active_session(&self) -> &UndoRedoSession<S> {
        self.nested
            .last()
            .map(|(_, session)| session)
            .unwrap_or(&self.default_session)
    }

    fn active_session_mut(&mut self) -> &mut UndoRedoSession<S> {
        match self.nested.last_mut() {
            Some((_, session)) => session,
            None => &mut self.default_session,
        }
    }

    fn is_active(&self, id: &SessionId) -> bool {
        self.active_session_id() == Some(id)
    }

    /// File a committed request on the active session
    pub fn commit(&mut self, request: Request<S>) {
        self.active_session_mut().commit(request);
    }

    /// Close the active session, folding its requests into the new active one
    ///
    /// Returns `Ok(false)` and changes nothing when `id` is not the active
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `MixedDocuments` if `merge` is set and the session holds
    /// requests of different documents; the session stays open.
    pub fn commit_session(&mut self, id: &SessionId, merge: bool) -> Result<bool> {
        if !self.is_active(id) {
            tracing::warn!(session_id = %id, "can not commit an inactive session");
            return Ok(false);
        }

        let start = Instant::now();
        log_op_start!("commit_session", session_id = %id, merge = merge);

        let requests = match self.active_session().to_requests(merge) {
            Ok(requests) => requests,
            Err(err) => {
                log_op_error!(
                    "commit_session",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    session_id = %id
                );
                return Err(err);
            }
        };
        self.nested.pop();
        let request_len = requests.len();
        for request in requests {
            self.commit(request);
        }

        log_op_end!(
            "commit_session",
            duration_ms = start.elapsed().as_millis() as u64,
            session_id = %id,
            request_len = request_len
        );
        Ok(true)
    }

    /// Undo everything committed during the active session and discard it
    ///
    /// Returns `Ok(false)` and changes nothing when `id` is not the active
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInProgress` if a request's document has an open
    /// transaction; the session stays open with its remaining requests.
    pub fn abort_session(&mut self, id: &SessionId) -> Result<bool> {
        if !self.is_active(id) {
            tracing::warn!(session_id = %id, "can not abort an inactive session");
            return Ok(false);
        }

        let start = Instant::now();
        log_op_start!("abort_session", session_id = %id);

        let session = self.active_session_mut();
        let mut undone: u64 = 0;
        while session.can_undo() {
            if let Err(err) = session.undo() {
                log_op_error!(
                    "abort_session",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    session_id = %id,
                    undone = undone
                );
                return Err(err);
            }
            undone += 1;
        }
        self.nested.pop();

        log_op_end!(
            "abort_session",
            duration_ms = start.elapsed().as_millis() as u64,
            session_id = %id,
            undone = undone
        );
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.active_session().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.active_session().can_redo()
    }

    /// Undo on the active session
    ///
    /// # Errors
    ///
    /// See [`UndoRedoSession::undo`].
    pub fn undo(&mut self) -> Result<bool> {
        self.active_session_mut().undo()
    }

    /// Redo on the active session
    ///
    /// # Errors
    ///
    /// See [`UndoRedoSession::redo`].
    pub fn redo(&mut self) -> Result<bool> {
        self.active_session_mut().redo()
    }

    /// Undo depth of the active session
    pub fn undo_depth(&self) -> usize {
        self.active_session().undo_depth()
    }

    /// Redo depth of the active session
    pub fn redo_depth(&self) -> usize {
        self.active_session().redo_depth()
    }
}

impl<S: EntityState> Default for UndoRedoManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::entity::Entity;
    use crate::registry::EntityRegistry;

    fn setup() -> (Document<u32>, Entity<u32>) {
        let doc = Document::new(EntityRegistry::new().with_plain("wall"));
        let wall = doc
            .run_untracked(|doc| doc.create_entity_with_state("wall", 0))
            .unwrap()
            .unwrap();
        (doc, wall)
    }

    fn set(doc: &Document<u32>, wall: &Entity<u32>, value: u32) -> Request<u32> {
        let txn = doc.start_transaction().unwrap();
        wall.modify(|s| *s = value).unwrap();
        txn.commit().unwrap()
    }

    #[test]
    fn test_session_undo_redo_moves_between_stacks() {
        let (doc, wall) = setup();
        let mut session = UndoRedoSession::new();
        session.commit(set(&doc, &wall, 1));
        session.commit(set(&doc, &wall, 2));

        assert!(session.undo().unwrap());
        assert_eq!(wall.state().as_deref(), Some(&1));
        assert_eq!((session.undo_depth(), session.redo_depth()), (1, 1));

        assert!(session.redo().unwrap());
        assert_eq!(wall.state().as_deref(), Some(&2));
        assert!(!session.can_redo());
    }

    #[test]
    fn test_empty_session_undo_is_noop() {
        let mut session: UndoRedoSession<u32> = UndoRedoSession::new();
        assert!(!session.undo().unwrap());
        assert!(!session.redo().unwrap());
    }

    #[test]
    fn test_commit_keeps_redo_stack() {
        let (doc, wall) = setup();
        let mut session = UndoRedoSession::new();
        session.commit(set(&doc, &wall, 1));
        session.undo().unwrap();
        session.commit(set(&doc, &wall, 5));
        assert_eq!(session.redo_depth(), 1);
    }

    #[test]
    fn test_to_requests_without_merge_returns_stack() {
        let (doc, wall) = setup();
        let mut session = UndoRedoSession::new();
        session.commit(set(&doc, &wall, 1));
        session.commit(set(&doc, &wall, 2));
        assert_eq!(session.to_requests(false).unwrap().len(), 2);
        assert_eq!(session.to_requests(true).unwrap().len(), 1);
    }

    #[test]
    fn test_inactive_session_is_not_committed() {
        let (doc, wall) = setup();
        let mut manager = UndoRedoManager::new();
        let outer = manager.start_session();
        let inner = manager.start_session();
        manager.commit(set(&doc, &wall, 1));

        assert!(!manager.commit_session(&outer, true).unwrap());
        assert!(!manager.abort_session(&outer).unwrap());
        assert_eq!(manager.session_depth(), 2);
        assert_eq!(manager.active_session_id(), Some(&inner));
    }

    #[test]
    fn test_commit_targets_default_without_sessions() {
        let (doc, wall) = setup();
        let mut manager = UndoRedoManager::new();
        assert!(manager.active_session_id().is_none());
        manager.commit(set(&doc, &wall, 1));
        assert!(manager.can_undo());
        assert!(manager.undo().unwrap());
        assert_eq!(wall.state().as_deref(), Some(&0));
        assert!(manager.can_redo());
    }
}
