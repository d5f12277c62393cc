//! WebSocket session lifecycle: one connected browser from upgrade through
//! disconnect, independent of the transport that accepted it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, trace, warn};

use super::connection::ClientConnection;
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::state::LiveState;

/// How long the writer gets to flush a close frame after the session ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A transport frame, reduced to what the session cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 payload.
    Text(String),
    /// Peer asked to close.
    Close,
    /// Ping, pong, undecodable binary, and the like.
    Other,
}

/// Run a session for one accepted socket.
///
/// 1. Registers the connection through the lifecycle policy
/// 2. Forwards broadcast frames to `outgoing` on a separate task
/// 3. Dispatches each inbound text frame through the router; a malformed
///    frame is logged and dropped, the session continues
/// 4. Ends on peer close, read error, server-side close, or shutdown
/// 5. Unregisters, which may schedule auto-shutdown
#[instrument(skip_all, fields(conn_id))]
pub async fn run_session<R, W, E>(state: Arc<LiveState>, mut incoming: R, outgoing: W)
where
    R: Stream<Item = Result<Frame, E>> + Unpin + Send,
    E: fmt::Display + Send,
    W: Sink<String> + Unpin + Send + 'static,
    W::Error: fmt::Display + Send,
{
    let (connection, mut outbound) = ClientConnection::channel(state.config.outbound_buffer);
    let _ = tracing::Span::current().record("conn_id", connection.id.as_str());

    if let Err(e) = state.lifecycle.on_open(Arc::clone(&connection)) {
        warn!(error = %e, "refusing connection");
        let mut outgoing = outgoing;
        let _ = outgoing.close().await;
        return;
    }
    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let writer_conn = Arc::clone(&connection);
    let writer = tokio::spawn(async move {
        let mut outgoing = outgoing;
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = outgoing.send(Arc::unwrap_or_clone(frame)).await {
                        debug!(error = %e, "socket write failed");
                        break;
                    }
                }
                () = writer_conn.closed() => break,
            }
        }
        let _ = outgoing.close().await;
        writer_conn.close();
    });

    loop {
        let frame = tokio::select! {
            frame = incoming.next() => frame,
            () = connection.closed() => {
                debug!("connection closed by server");
                break;
            }
            () = state.shutdown.cancelled() => break,
        };
        match frame {
            Some(Ok(Frame::Text(text))) => match state.router.dispatch(&text, &connection) {
                Ok(outcome) => trace!(?outcome, "inbound frame handled"),
                Err(e) => warn!(error = %e, len = text.len(), "dropping inbound frame"),
            },
            Some(Ok(Frame::Other)) => {}
            Some(Ok(Frame::Close)) | None => {
                debug!("client closed the socket");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
        }
    }

    connection.close();
    let abort = writer.abort_handle();
    if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }

    state.lifecycle.on_close(&connection.id);
    info!(frames_sent = connection.frames_sent(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}
