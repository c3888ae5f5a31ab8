//! In-memory capture of engine log events
//!
//! One global layer records every event. Tests then select events with an
//! [`EventQuery`] on the boundary fields the engine emits: `op`, `event`,
//! `session_id`, `transaction_id` and `err_code`. All tests of a binary share
//! the process, so a query should pin something unique to its test; a fresh
//! `SessionId` or `TransactionId` does.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use vedoc_core_types::schema::{
    FIELD_ERR_CODE, FIELD_EVENT, FIELD_OP, FIELD_SESSION_ID, FIELD_TRANSACTION_ID,
};
use vedoc_core_types::{SessionId, TransactionId};

/// One recorded event
///
/// The boundary fields are lifted out of `fields` for querying; `fields`
/// still holds everything, message included.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub op: Option<String>,
    pub event: Option<String>,
    pub session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub err_code: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    fn new(level: Level, target: &str, fields: BTreeMap<String, String>) -> Self {
        let lift = |name: &str| fields.get(name).cloned();
        Self {
            level,
            target: target.to_string(),
            op: lift(FIELD_OP),
            event: lift(FIELD_EVENT),
            session_id: lift(FIELD_SESSION_ID),
            transaction_id: lift(FIELD_TRANSACTION_ID),
            err_code: lift(FIELD_ERR_CODE),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Emitted by one of the `log_op_*` macros
    pub fn is_boundary(&self) -> bool {
        self.op.is_some() && self.event.is_some()
    }
}

/// Selection of captured events; criteria left unset match anything
#[derive(Clone, Debug, Default)]
pub struct EventQuery {
    op: Option<String>,
    event: Option<String>,
    session_id: Option<String>,
    transaction_id: Option<String>,
    err_code: Option<String>,
    boundary_only: bool,
}

impl EventQuery {
    pub fn any() -> Self {
        Self::default()
    }

    /// Boundary events of operation `op`
    pub fn op(op: impl Into<String>) -> Self {
        Self {
            op: Some(op.into()),
            boundary_only: true,
            ..Self::default()
        }
    }

    pub fn event(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }

    pub fn session(mut self, id: &SessionId) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    pub fn transaction(mut self, id: &TransactionId) -> Self {
        self.transaction_id = Some(id.to_string());
        self
    }

    pub fn err_code(mut self, code: &str) -> Self {
        self.err_code = Some(code.to_string());
        self
    }

    /// Only events emitted by the `log_op_*` macros
    pub fn boundary(mut self) -> Self {
        self.boundary_only = true;
        self
    }

    pub fn matches(&self, captured: &CapturedEvent) -> bool {
        fn pinned(want: &Option<String>, got: &Option<String>) -> bool {
            want.is_none() || want == got
        }
        (!self.boundary_only || captured.is_boundary())
            && pinned(&self.op, &captured.op)
            && pinned(&self.event, &captured.event)
            && pinned(&self.session_id, &captured.session_id)
            && pinned(&self.transaction_id, &captured.transaction_id)
            && pinned(&self.err_code, &captured.err_code)
    }
}

/// Collects field values as strings
///
/// Numbers, booleans and `%`/`?` values all arrive through `record_debug`,
/// whose output for those types matches their display form.
#[derive(Default)]
struct FieldRecorder(BTreeMap<String, String>);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

type Sink = Arc<Mutex<Vec<CapturedEvent>>>;

fn lock(sink: &Sink) -> MutexGuard<'_, Vec<CapturedEvent>> {
    // A test that panicked while holding the lock must not hide later events
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Layer appending every event to a shared sink
pub struct CaptureLayer {
    sink: Sink,
}

impl CaptureLayer {
    pub fn new() -> (Self, TestCapture) {
        let sink = Sink::default();
        (Self { sink: sink.clone() }, TestCapture { sink })
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        let metadata = event.metadata();
        lock(&self.sink).push(CapturedEvent::new(
            *metadata.level(),
            metadata.target(),
            recorder.0,
        ));
    }
}

/// Read side of a [`CaptureLayer`]
#[derive(Clone)]
pub struct TestCapture {
    sink: Sink,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        lock(&self.sink).clone()
    }

    pub fn find(&self, query: &EventQuery) -> Vec<CapturedEvent> {
        lock(&self.sink)
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    pub fn count(&self, query: &EventQuery) -> usize {
        lock(&self.sink).iter().filter(|e| query.matches(e)).count()
    }

    /// The single event matching `query`
    ///
    /// # Panics
    ///
    /// Panics unless exactly one event matches.
    pub fn assert_once(&self, query: &EventQuery) -> CapturedEvent {
        let mut found = self.find(query);
        assert_eq!(
            found.len(),
            1,
            "expected exactly one event for {:?}, found {}",
            query,
            found.len()
        );
        found.remove(0)
    }

    /// # Panics
    ///
    /// Panics if any event matches `query`.
    pub fn assert_none(&self, query: &EventQuery) {
        let found = self.find(query);
        assert!(found.is_empty(), "unexpected events for {:?}: {:?}", query, found);
    }

    pub fn clear(&self) {
        lock(&self.sink).clear();
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber (once per process)
///
/// If another subscriber won the race the returned capture stays empty.
///
/// ```
/// use vedoc_core::logging_facility::test_capture::{init_test_capture, EventQuery};
/// use vedoc_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("doc_example_op");
/// capture.assert_once(&EventQuery::op("doc_example_op").event("start"));
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let (layer, capture) = CaptureLayer::new();
            let _ = tracing_subscriber::registry().with(layer).try_init();
            capture
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(pairs: &[(&str, &str)]) -> CapturedEvent {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CapturedEvent::new(Level::INFO, "vedoc_core::undo", fields)
    }

    #[test]
    fn test_boundary_fields_are_lifted() {
        let event = captured(&[
            ("op", "commit_session"),
            ("event", "end_error"),
            ("session_id", "s-1"),
            ("err_code", "ERR_MIXED_DOCUMENTS"),
        ]);
        assert!(event.is_boundary());
        assert_eq!(event.session_id.as_deref(), Some("s-1"));
        assert_eq!(event.err_code.as_deref(), Some("ERR_MIXED_DOCUMENTS"));
        assert_eq!(event.field("op"), Some("commit_session"));
    }

    #[test]
    fn test_query_pins_only_what_is_set() {
        let event = captured(&[("op", "abort_session"), ("event", "start")]);
        assert!(EventQuery::any().matches(&event));
        assert!(EventQuery::op("abort_session").matches(&event));
        assert!(!EventQuery::op("abort_session").event("end").matches(&event));
        assert!(!EventQuery::any().err_code("ERR_X").matches(&event));

        let detail = captured(&[("session_id", "s-2")]);
        assert!(EventQuery::any().matches(&detail));
        assert!(!EventQuery::any().boundary().matches(&detail));
    }

    #[test]
    fn test_fresh_layer_is_empty() {
        let (_layer, capture) = CaptureLayer::new();
        assert_eq!(capture.count(&EventQuery::any()), 0);
        capture.assert_none(&EventQuery::op("anything"));
    }
}
