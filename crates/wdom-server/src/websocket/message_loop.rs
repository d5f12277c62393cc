//! Periodic flush of the outbound queue to every live connection.
//!
//! Each tick drains the whole queue, encodes it once as a JSON array, and
//! writes that frame to a snapshot of the registry. A connection whose write
//! fails is dropped from the registry and closed; the others still get the
//! batch, and the loop keeps its cadence.
//!
//! A batch that reaches no browser takes its queries with it: their pending
//! requests are cancelled so the awaiting callers fail instead of hanging.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wdom_core::ids::ConnectionId;
use wdom_core::messages::{encode_batch, OutboundMessage};

use super::registry::ConnectionRegistry;
use crate::document::{Document, MessageQueue, PendingRequests};
use crate::metrics::{WDOM_BATCHES_SENT_TOTAL, WDOM_MESSAGES_SENT_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// What one flush did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages drained from the queue.
    pub messages: usize,
    /// Connections the batch was handed to.
    pub delivered: usize,
    /// Connections dropped because the write failed.
    pub dropped: Vec<ConnectionId>,
    /// Queries cancelled because the batch reached no browser.
    pub abandoned: usize,
}

/// Drains the document queue every `wait` and broadcasts the batch.
#[derive(Debug)]
pub struct MessageLoop {
    queue: Arc<MessageQueue>,
    pending: Arc<PendingRequests>,
    registry: Arc<ConnectionRegistry>,
    wait: Duration,
}

impl MessageLoop {
    /// Create a loop over `document`'s queue and connections.
    pub fn new(document: &Document, wait: Duration) -> Self {
        Self {
            queue: Arc::clone(document.queue()),
            pending: Arc::clone(document.pending()),
            registry: Arc::clone(document.registry()),
            wait,
        }
    }

    /// Drain the queue and broadcast once.
    ///
    /// With no live connections the drained batch is discarded; browsers
    /// that connect later get no replay. Queries in a batch that no
    /// connection accepted are cancelled.
    pub fn flush(&self) -> FlushReport {
        let batch = self.queue.drain();
        if batch.is_empty() {
            return FlushReport::default();
        }
        let mut report = FlushReport {
            messages: batch.len(),
            ..FlushReport::default()
        };

        let frame = match encode_batch(&batch) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                error!(error = %e, messages = batch.len(), "failed to encode outbound batch");
                report.abandoned = self.abandon_queries(&batch);
                return report;
            }
        };

        let connections = self.registry.snapshot();
        if connections.is_empty() {
            debug!(messages = batch.len(), "no connections, discarding batch");
            report.abandoned = self.abandon_queries(&batch);
            return report;
        }

        for conn in connections {
            match conn.send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(conn_id = %conn.id, error = %e, "broadcast write failed, dropping connection");
                    counter!(WS_BROADCAST_DROPS_TOTAL, "reason" => e.code()).increment(1);
                    let _ = self.registry.unregister(&conn.id);
                    conn.close();
                    report.dropped.push(conn.id.clone());
                }
            }
        }

        if report.delivered == 0 {
            report.abandoned = self.abandon_queries(&batch);
            return report;
        }
        counter!(WDOM_BATCHES_SENT_TOTAL).increment(1);
        counter!(WDOM_MESSAGES_SENT_TOTAL).increment(batch.len() as u64);
        report
    }

    fn abandon_queries(&self, batch: &[OutboundMessage]) -> usize {
        let cancelled = batch
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Query { request_id, .. } => Some(request_id),
                OutboundMessage::Dom { .. } => None,
            })
            .filter(|id| self.pending.cancel(id))
            .count();
        if cancelled > 0 {
            debug!(requests = cancelled, "cancelled queries that reached no browser");
        }
        cancelled
    }

    /// Flush every `wait` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(wait = ?self.wait, "message loop started");
        loop {
            let _ = self.flush();
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.wait) => {}
            }
        }
        info!("message loop stopped");
    }

    /// Run the loop on a background task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ClientConnection;
    use assert_matches::assert_matches;
    use serde_json::Value;
    use wdom_core::errors::SyncError;

    fn frame_targets(frame: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(frame).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["target"].as_str().unwrap().to_owned())
            .collect()
    }

    fn enqueue(doc: &Document, target: &str) {
        doc.queue()
            .enqueue(OutboundMessage::dom(target.into(), "setText", vec![]));
    }

    #[test]
    fn empty_queue_broadcasts_nothing() {
        let doc = Document::new();
        let (conn, mut rx) = ClientConnection::channel(8);
        doc.registry().register(conn).unwrap();
        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report, FlushReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn batch_is_one_frame_in_enqueue_order() {
        let doc = Document::new();
        let (conn, mut rx) = ClientConnection::channel(8);
        doc.registry().register(conn).unwrap();
        for t in ["a", "b", "c"] {
            enqueue(&doc, t);
        }

        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report.messages, 3);
        assert_eq!(report.delivered, 1);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame_targets(&frame), ["a", "b", "c"]);
        assert!(rx.try_recv().is_err());
        assert!(doc.queue().is_empty());
    }

    #[test]
    fn batch_without_connections_is_discarded() {
        let doc = Document::new();
        enqueue(&doc, "a");
        let lp = MessageLoop::new(&doc, Duration::from_millis(5));
        let report = lp.flush();
        assert_eq!(report.messages, 1);
        assert_eq!(report.delivered, 0);
        assert!(doc.queue().is_empty());

        let (conn, mut rx) = ClientConnection::channel(8);
        doc.registry().register(conn).unwrap();
        assert_eq!(lp.flush().messages, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn discarded_batch_fails_its_queries() {
        let doc = Document::new();
        let el = doc.create_element("div");
        let response = el.query("getBoundingClientRect", vec![]);
        enqueue(&doc, "a");

        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report.messages, 2);
        assert_eq!(report.abandoned, 1);
        assert!(doc.pending().is_empty());
        assert_matches!(response.await, Err(SyncError::RequestDropped { .. }));
    }

    #[test]
    fn abandoned_queries_do_not_accumulate() {
        let doc = Document::new();
        let el = doc.create_element("div");
        let lp = MessageLoop::new(&doc, Duration::from_millis(5));
        for _ in 0..100 {
            drop(el.query("getBoundingClientRect", vec![]));
        }
        assert_eq!(lp.flush().messages, 100);
        assert!(doc.pending().is_empty());

        let kept: Vec<_> = (0..10)
            .map(|_| el.query("getBoundingClientRect", vec![]))
            .collect();
        assert_eq!(doc.pending().len(), 10);
        assert_eq!(lp.flush().abandoned, 10);
        assert!(doc.pending().is_empty());
        drop(kept);
    }

    #[tokio::test]
    async fn batch_rejected_by_every_connection_fails_its_queries() {
        let doc = Document::new();
        let (dead, dead_rx) = ClientConnection::channel(8);
        drop(dead_rx);
        doc.registry().register(dead).unwrap();
        let response = doc.create_element("div").query("getBoundingClientRect", vec![]);

        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.abandoned, 1);
        assert_matches!(response.await, Err(SyncError::RequestDropped { .. }));
    }

    #[test]
    fn delivered_queries_stay_pending() {
        let doc = Document::new();
        let (conn, _rx) = ClientConnection::channel(8);
        doc.registry().register(conn).unwrap();
        let _response = doc.create_element("div").query("getBoundingClientRect", vec![]);

        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(doc.pending().len(), 1);
    }

    #[test]
    fn failed_write_drops_only_that_connection() {
        let doc = Document::new();
        let (good, mut good_rx) = ClientConnection::channel(8);
        let (bad, bad_rx) = ClientConnection::channel(8);
        drop(bad_rx);
        doc.registry().register(Arc::clone(&good)).unwrap();
        doc.registry().register(Arc::clone(&bad)).unwrap();
        for t in ["1", "2", "3"] {
            enqueue(&doc, t);
        }

        let report = MessageLoop::new(&doc, Duration::from_millis(5)).flush();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![bad.id.clone()]);
        assert!(bad.is_closed());
        assert!(!doc.registry().contains(&bad.id));
        assert!(doc.registry().contains(&good.id));
        assert_eq!(frame_targets(&good_rx.try_recv().unwrap()), ["1", "2", "3"]);
    }

    #[test]
    fn full_buffer_drops_slow_connection() {
        let doc = Document::new();
        let (slow, _slow_rx) = ClientConnection::channel(1);
        doc.registry().register(Arc::clone(&slow)).unwrap();
        let lp = MessageLoop::new(&doc, Duration::from_millis(5));

        enqueue(&doc, "a");
        assert_eq!(lp.flush().delivered, 1);
        enqueue(&doc, "b");
        let report = lp.flush();
        assert_eq!(report.dropped, vec![slow.id.clone()]);
        assert!(!doc.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_cadence_after_a_failed_write() {
        let doc = Document::new();
        let (good, mut good_rx) = ClientConnection::channel(8);
        let (bad, bad_rx) = ClientConnection::channel(8);
        drop(bad_rx);
        doc.registry().register(good).unwrap();
        doc.registry().register(bad).unwrap();
        for t in ["1", "2", "3"] {
            enqueue(&doc, t);
        }

        let shutdown = CancellationToken::new();
        let handle = MessageLoop::new(&doc, Duration::from_millis(5)).spawn(shutdown.clone());

        let first = good_rx.recv().await.unwrap();
        assert_eq!(frame_targets(&first), ["1", "2", "3"]);
        assert_eq!(doc.registry().connection_count(), 1);

        enqueue(&doc, "4");
        let second = tokio::time::timeout(Duration::from_millis(20), good_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame_targets(&second), ["4"]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_on_shutdown() {
        let doc = Document::new();
        let shutdown = CancellationToken::new();
        let handle = MessageLoop::new(&doc, Duration::from_secs(60)).spawn(shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
