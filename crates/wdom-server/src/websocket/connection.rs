//! WebSocket client connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use wdom_core::errors::SyncError;
use wdom_core::ids::ConnectionId;

/// One open duplex channel to a browser tab.
///
/// Frames handed to [`ClientConnection::send`] go onto a bounded channel
/// that the transport's session task writes to the socket, so a send never
/// waits on the network.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the session's socket writer.
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled once the connection is closed from either side.
    closed: CancellationToken,
    /// Frames successfully handed to the writer.
    frames_sent: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around an existing writer channel.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Create a connection with a fresh ID and a writer channel of `capacity`.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(ConnectionId::new(), tx)), rx)
    }

    /// Write one frame to the client.
    ///
    /// Fails with [`SyncError::ConnectionClosed`] when the peer is gone and
    /// [`SyncError::Backpressure`] when the writer is too far behind.
    pub fn send(&self, frame: Arc<String>) -> Result<(), SyncError> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        match self.tx.try_send(frame) {
            Ok(()) => {
                let _ = self.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SyncError::Backpressure {
                connection_id: self.id.clone(),
            }),
            Err(TrySendError::Closed(_)) => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> SyncError {
        SyncError::ConnectionClosed {
            connection_id: self.id.clone(),
        }
    }

    /// Ask the session task to close the socket. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`ClientConnection::close`] was called or the writer is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once [`ClientConnection::close`] is called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Frames successfully handed to the writer.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("frames_sent", &self.frames_sent())
            .finish_non_exhaustive()
    }
}
