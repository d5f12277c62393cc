//! Inbound frame dispatch.
//!
//! Every text frame from a browser is parsed into an [`InboundMessage`] and
//! routed by kind:
//!
//! - `log`: re-emitted on the process log under [`CLIENT_LOG_TARGET`]
//! - `event`: delivered to the listeners of the target element
//! - `response`: completes the matching pending request
//!
//! Malformed frames are the only error surfaced to the caller. Events for
//! removed elements and answers to requests nobody waits for are expected
//! races and are only counted.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, trace, warn};
use wdom_core::errors::SyncError;
use wdom_core::logging::CLIENT_LOG_TARGET;
use wdom_core::messages::{ClientLogLevel, EventMessage, InboundMessage, LogMessage, ResponseMessage};

use super::connection::ClientConnection;
use crate::document::{Document, DomEvent};
use crate::metrics::{
    WDOM_INBOUND_MESSAGES_TOTAL, WDOM_LISTENER_PANICS_TOTAL, WDOM_MALFORMED_MESSAGES_TOTAL,
    WDOM_STALE_EVENTS_TOTAL, WDOM_STALE_RESPONSES_TOTAL,
};

/// How an inbound frame was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Client log line forwarded.
    Logged,
    /// Event delivered to this many listeners.
    EventDelivered {
        /// Listeners invoked.
        listeners: usize,
    },
    /// Event for an element no longer in the tree.
    EventIgnored,
    /// Pending request completed.
    ResponseResolved,
    /// Response for a request that is not pending.
    ResponseIgnored,
}

/// Routes browser frames into the document.
#[derive(Debug, Clone)]
pub struct InboundRouter {
    document: Arc<Document>,
}

impl InboundRouter {
    /// Create a router over `document`.
    pub fn new(document: Arc<Document>) -> Self {
        Self { document }
    }

    /// Handle one raw text frame received on `connection`.
    pub fn dispatch(&self, raw: &str, connection: &ClientConnection) -> Result<Dispatched, SyncError> {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                counter!(WDOM_MALFORMED_MESSAGES_TOTAL).increment(1);
                return Err(e);
            }
        };
        counter!(WDOM_INBOUND_MESSAGES_TOTAL, "kind" => message.kind()).increment(1);

        let outcome = match message {
            InboundMessage::Log(log) => {
                forward_log(&log, connection);
                Dispatched::Logged
            }
            InboundMessage::Event(event) => self.deliver_event(event, connection),
            InboundMessage::Response(response) => self.resolve_response(response, connection),
        };
        Ok(outcome)
    }

    fn deliver_event(&self, event: EventMessage, connection: &ClientConnection) -> Dispatched {
        let Some(element) = self.document.element(&event.target) else {
            let err = SyncError::UnknownTarget {
                target: event.target,
            };
            debug!(conn_id = %connection.id, error = %err, event = %event.event, "ignoring event");
            counter!(WDOM_STALE_EVENTS_TOTAL).increment(1);
            return Dispatched::EventIgnored;
        };

        let event = DomEvent::from(event);
        trace!(conn_id = %connection.id, element = %event.target, kind = %event.kind, "delivering event");
        // A panicking listener must not take the session down with it.
        match catch_unwind(AssertUnwindSafe(|| element.dispatch(&event))) {
            Ok(listeners) => Dispatched::EventDelivered { listeners },
            Err(_) => {
                error!(element = %event.target, kind = %event.kind, "event listener panicked");
                counter!(WDOM_LISTENER_PANICS_TOTAL).increment(1);
                Dispatched::EventDelivered { listeners: 0 }
            }
        }
    }

    fn resolve_response(&self, response: ResponseMessage, connection: &ClientConnection) -> Dispatched {
        match self
            .document
            .pending()
            .resolve(&response.request_id, response.value)
        {
            Ok(()) => Dispatched::ResponseResolved,
            Err(e) => {
                debug!(conn_id = %connection.id, error = %e, "ignoring response");
                counter!(WDOM_STALE_RESPONSES_TOTAL).increment(1);
                Dispatched::ResponseIgnored
            }
        }
    }
}

fn forward_log(log: &LogMessage, connection: &ClientConnection) {
    let conn_id = connection.id.as_str();
    let text = log.text();
    match log.level() {
        ClientLogLevel::Trace => trace!(target: CLIENT_LOG_TARGET, conn_id, "{text}"),
        ClientLogLevel::Debug => debug!(target: CLIENT_LOG_TARGET, conn_id, "{text}"),
        ClientLogLevel::Info => info!(target: CLIENT_LOG_TARGET, conn_id, "{text}"),
        ClientLogLevel::Warn => warn!(target: CLIENT_LOG_TARGET, conn_id, "{text}"),
        ClientLogLevel::Error => error!(target: CLIENT_LOG_TARGET, conn_id, "{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;
    use wdom_core::logging::capture_logs;

    fn setup() -> (Arc<Document>, InboundRouter, Arc<ClientConnection>) {
        let doc = Arc::new(Document::new());
        let router = InboundRouter::new(Arc::clone(&doc));
        let (conn, _rx) = ClientConnection::channel(8);
        (doc, router, conn)
    }

    #[test]
    fn click_reaches_listener_once() {
        let (doc, router, conn) = setup();
        let button = doc.create_element_with_id("btn".into(), "button");
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        button.add_event_listener("click", move |ev| {
            assert_eq!(ev.target.as_str(), "btn");
            let _ = seen.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = router
            .dispatch(r#"{"type":"event","target":"btn","event":"click"}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::EventDelivered { listeners: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_for_other_kind_invokes_nobody() {
        let (doc, router, conn) = setup();
        let button = doc.create_element_with_id("btn".into(), "button");
        button.add_event_listener("click", |_| panic!("wrong listener"));
        let outcome = router
            .dispatch(r#"{"type":"event","target":"btn","event":"input"}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::EventDelivered { listeners: 0 });
    }

    #[test]
    fn event_for_removed_element_is_ignored() {
        let (doc, router, conn) = setup();
        let el = doc.create_element_with_id("gone".into(), "div");
        el.add_event_listener("click", |_| panic!("removed element must not fire"));
        let _ = doc.remove_element(el.id());

        let outcome = router
            .dispatch(r#"{"type":"event","target":"gone","event":"click"}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::EventIgnored);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let (doc, router, conn) = setup();
        let el = doc.create_element_with_id("boom".into(), "div");
        el.add_event_listener("click", |_| panic!("listener bug"));
        let outcome = router
            .dispatch(r#"{"type":"event","target":"boom","event":"click"}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::EventDelivered { listeners: 0 });
    }

    #[test]
    fn event_detail_reaches_listener() {
        let (doc, router, conn) = setup();
        let input = doc.create_element_with_id("in".into(), "input");
        let value = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&value);
        input.add_event_listener("input", move |ev| {
            *sink.lock() = ev.detail.get("value").cloned();
        });
        let _ = router
            .dispatch(
                r#"{"type":"event","target":"in","event":"input","value":"abc"}"#,
                &conn,
            )
            .unwrap();
        assert_eq!(*value.lock(), Some(json!("abc")));
    }

    #[tokio::test]
    async fn response_resolves_pending_query() {
        let (doc, router, conn) = setup();
        let el = doc.create_element("div");
        let pending = el.query("getBoundingClientRect", vec![]);
        let raw = json!({"type": "response", "request_id": pending.request_id(), "value": {"width": 10}})
            .to_string();

        assert_eq!(router.dispatch(&raw, &conn).unwrap(), Dispatched::ResponseResolved);
        assert_eq!(pending.await.unwrap(), json!({"width": 10}));
        assert!(doc.pending().is_empty());
    }

    #[test]
    fn response_for_unknown_request_is_ignored() {
        let (_doc, router, conn) = setup();
        let outcome = router
            .dispatch(r#"{"type":"response","request_id":"nobody","value":1}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::ResponseIgnored);
    }

    #[test]
    fn malformed_frame_is_an_error_without_side_effects() {
        let (doc, router, conn) = setup();
        let el = doc.create_element_with_id("btn".into(), "button");
        el.add_event_listener("click", |_| panic!("must not fire"));
        for raw in ["{", r#"{"target":"btn","event":"click"}"#, r#"{"type":"dance"}"#] {
            let err = router.dispatch(raw, &conn).unwrap_err();
            assert_matches!(err, SyncError::MalformedMessage { .. });
        }
        assert!(doc.queue().is_empty());
    }

    #[test]
    fn client_log_uses_client_target_and_level() {
        let (logs, _guard) = capture_logs();
        let (doc, router, conn) = setup();
        let outcome = router
            .dispatch(r#"{"type":"log","level":"warning","message":"x"}"#, &conn)
            .unwrap();
        assert_eq!(outcome, Dispatched::Logged);
        assert!(doc.queue().is_empty());
        assert!(doc.pending().is_empty());
        assert_eq!(doc.element_count(), 0);

        let events = logs.events_for_target(CLIENT_LOG_TARGET);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[0].message, "x");
        assert!(
            events[0]
                .fields
                .iter()
                .any(|(k, v)| k == "conn_id" && v == conn.id.as_str())
        );
    }

    #[test]
    fn client_log_leaves_document_untouched() {
        let (doc, router, conn) = setup();
        let el = doc.create_element("div");
        el.set_attribute("class", "x");
        let _response = el.query("getBoundingClientRect", vec![]);
        let queued = doc.queue().len();

        for level in ["debug", "info", "warning", "error"] {
            let raw = json!({"type": "log", "level": level, "message": "m"}).to_string();
            assert_eq!(router.dispatch(&raw, &conn).unwrap(), Dispatched::Logged);
        }
        assert_eq!(doc.queue().len(), queued);
        assert_eq!(doc.pending().len(), 1);
        assert_eq!(doc.element_count(), 1);
    }

    #[test]
    fn client_log_without_level_is_info() {
        let (logs, _guard) = capture_logs();
        let (_doc, router, conn) = setup();
        let _ = router
            .dispatch(r#"{"type":"log","message":"hello"}"#, &conn)
            .unwrap();
        let events = logs.events_for_target(CLIENT_LOG_TARGET);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::INFO);
    }
}
