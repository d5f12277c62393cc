//! Server-side element mirrored in the browser.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use wdom_core::ids::ElementId;
use wdom_core::messages::{EventMessage, OutboundMessage};

use super::pending::{PendingRequests, PendingResponse};
use super::queue::MessageQueue;

/// A DOM event delivered to server-side listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct DomEvent {
    /// Event type, e.g. `click`.
    pub kind: String,
    /// Element the event fired on.
    pub target: ElementId,
    /// Event-specific fields sent by the browser.
    pub detail: Map<String, Value>,
}

impl From<EventMessage> for DomEvent {
    fn from(msg: EventMessage) -> Self {
        Self {
            kind: msg.event,
            target: msg.target,
            detail: msg.detail,
        }
    }
}

/// Callback invoked for a matching [`DomEvent`].
pub type Listener = Arc<dyn Fn(&DomEvent) + Send + Sync>;

/// One element of the document tree.
///
/// Mutators do not touch any socket; they enqueue a `dom` message that the
/// message loop flushes to every connected browser.
pub struct Element {
    id: ElementId,
    tag: String,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    queue: Arc<MessageQueue>,
    pending: Arc<PendingRequests>,
}

impl Element {
    pub(crate) fn new(
        id: ElementId,
        tag: impl Into<String>,
        queue: Arc<MessageQueue>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            id,
            tag: tag.into(),
            listeners: RwLock::new(HashMap::new()),
            queue,
            pending,
        }
    }

    /// Element ID shared with the browser.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Register `listener` for events of type `event`.
    pub fn add_event_listener(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&DomEvent) + Send + Sync + 'static,
    ) {
        self.listeners
            .write()
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Drop every listener for `event`. Returns how many were removed.
    pub fn remove_event_listeners(&self, event: &str) -> usize {
        self.listeners.write().remove(event).map_or(0, |l| l.len())
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `event.kind`, in registration
    /// order. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &DomEvent) -> usize {
        // Snapshot so listeners may add or remove listeners themselves.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Set an attribute on the browser element.
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.js_exec("setAttribute", vec![json!(name), json!(value)]);
    }

    /// Remove an attribute from the browser element.
    pub fn remove_attribute(&self, name: &str) {
        self.js_exec("removeAttribute", vec![json!(name)]);
    }

    /// Replace the browser element's text content.
    pub fn set_text_content(&self, text: &str) {
        self.js_exec("textContent", vec![json!(text)]);
    }

    /// Enqueue an arbitrary DOM method call on the browser element.
    pub fn js_exec(&self, method: &str, params: Vec<Value>) {
        self.queue
            .enqueue(OutboundMessage::dom(self.id.clone(), method, params));
    }

    /// Ask the browser to evaluate `method` on this element.
    ///
    /// The request is sent with the next flush; await the returned future
    /// for the client's answer.
    pub fn query(&self, method: &str, params: Vec<Value>) -> PendingResponse {
        let (request_id, response) = self.pending.issue();
        self.queue.enqueue(OutboundMessage::Query {
            request_id,
            target: self.id.clone(),
            method: method.to_string(),
            params,
        });
        response
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("listeners", &self.listeners.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
