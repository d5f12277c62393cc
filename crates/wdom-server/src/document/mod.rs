//! Server-side document: the element tree, the outbound queue, pending
//! client queries, and the set of live connections.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `element` | Elements, event listeners, DOM mutators |
//! | `pending` | RPC-style requests awaiting a client `response` |
//! | `queue` | Outbound message batching |
//!
//! One `Document` is created at startup and shared as `Arc<Document>` with
//! the router, the message loop, and the lifecycle policy.

pub mod element;
pub mod pending;
pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use wdom_core::ids::ElementId;
use wdom_core::messages::OutboundMessage;

use crate::websocket::registry::ConnectionRegistry;

pub use element::{DomEvent, Element, Listener};
pub use pending::{PendingRequests, PendingResponse};
pub use queue::MessageQueue;

/// Root owner of the element tree and the live connection set.
#[derive(Debug, Default)]
pub struct Document {
    elements: RwLock<HashMap<ElementId, Arc<Element>>>,
    queue: Arc<MessageQueue>,
    pending: Arc<PendingRequests>,
    registry: Arc<ConnectionRegistry>,
}

impl Document {
    /// Create an empty document with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element with a fresh ID and add it to the tree.
    pub fn create_element(&self, tag: &str) -> Arc<Element> {
        self.create_element_with_id(ElementId::new(), tag)
    }

    /// Create an element with a caller-chosen ID, replacing any element
    /// already registered under it.
    pub fn create_element_with_id(&self, id: ElementId, tag: &str) -> Arc<Element> {
        let element = Arc::new(Element::new(
            id.clone(),
            tag,
            Arc::clone(&self.queue),
            Arc::clone(&self.pending),
        ));
        let _ = self.elements.write().insert(id, Arc::clone(&element));
        element
    }

    /// Look up an element still present in the tree.
    pub fn element(&self, id: &ElementId) -> Option<Arc<Element>> {
        self.elements.read().get(id).cloned()
    }

    /// Remove an element from the tree and tell browsers to drop it.
    ///
    /// Events the browser reports for it afterwards are ignored.
    pub fn remove_element(&self, id: &ElementId) -> Option<Arc<Element>> {
        let removed = self.elements.write().remove(id)?;
        debug!(element = %id, "element removed");
        self.queue
            .enqueue(OutboundMessage::dom(id.clone(), "remove", Vec::new()));
        Some(removed)
    }

    /// Number of elements in the tree.
    pub fn element_count(&self) -> usize {
        self.elements.read().len()
    }

    /// Whether any browser is connected.
    pub fn is_connected(&self) -> bool {
        self.registry.any_connected()
    }

    /// The outbound message queue.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Requests awaiting a client response.
    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    /// The live connection set.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}
