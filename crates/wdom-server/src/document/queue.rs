//! Outbound message queue.
//!
//! The document model appends change messages here; the message loop drains
//! them in one batch per tick. `enqueue` and `drain` serialize on one mutex,
//! so a racing enqueue lands either in the current drain or the next one.

use metrics::gauge;
use parking_lot::Mutex;
use wdom_core::messages::OutboundMessage;

use crate::metrics::WDOM_OUTBOUND_QUEUE_LEN;

/// Unbounded, insertion-ordered buffer of pending outbound messages.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: Mutex<Vec<OutboundMessage>>,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Never blocks on I/O, never drops.
    pub fn enqueue(&self, message: OutboundMessage) {
        let mut pending = self.pending.lock();
        pending.push(message);
        gauge!(WDOM_OUTBOUND_QUEUE_LEN).set(pending.len() as f64);
    }

    /// Take everything queued so far, in insertion order.
    ///
    /// Returns an empty `Vec` when nothing is pending.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if !batch.is_empty() {
            gauge!(WDOM_OUTBOUND_QUEUE_LEN).set(0.0);
        }
        batch
    }

    /// Number of messages waiting for the next flush.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
