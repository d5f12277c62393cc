//! Table of RPC-style requests awaiting a client `response`.
//!
//! An entry leaves the table when the client answers, when the request is
//! cancelled, or when its [`PendingResponse`] is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use wdom_core::errors::SyncError;
use wdom_core::ids::RequestId;

/// Pending requests keyed by request ID.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiting: Mutex<HashMap<RequestId, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request and return its ID with the future for its answer.
    pub fn issue(self: &Arc<Self>) -> (RequestId, PendingResponse) {
        let request_id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        let _ = self.waiting.lock().insert(request_id.clone(), tx);
        let response = PendingResponse {
            request_id: request_id.clone(),
            rx,
            table: Arc::downgrade(self),
        };
        (request_id, response)
    }

    /// Complete a pending request and remove it from the table.
    ///
    /// Fails with [`SyncError::StaleResponse`] when no such request is
    /// pending (late or duplicate answer).
    pub fn resolve(&self, request_id: &RequestId, value: Value) -> Result<(), SyncError> {
        let Some(tx) = self.waiting.lock().remove(request_id) else {
            return Err(SyncError::StaleResponse {
                request_id: request_id.clone(),
            });
        };
        // The awaiting side may have given up; the entry is gone either way.
        let _ = tx.send(value);
        Ok(())
    }

    /// Forget a request without answering it. Its future fails with
    /// [`SyncError::RequestDropped`].
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        self.waiting.lock().remove(request_id).is_some()
    }

    /// Number of requests still waiting.
    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Whether no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

/// Future resolving to the value the client sent back.
///
/// Dropping it withdraws the request from its table.
#[derive(Debug)]
pub struct PendingResponse {
    request_id: RequestId,
    rx: oneshot::Receiver<Value>,
    table: Weak<PendingRequests>,
}

impl PendingResponse {
    /// The request this future is waiting on.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for PendingResponse {
    type Output = Result<Value, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.map_err(|_| SyncError::RequestDropped {
                request_id: self.request_id.clone(),
            })
        })
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let _ = table.cancel(&self.request_id);
        }
    }
}
