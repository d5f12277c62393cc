//! Transport adapter boundary.
//!
//! The synchronization core only needs two things from a transport: accept
//! WebSocket upgrades on the configured path (handing each socket to
//! [`run_session`](crate::websocket::session::run_session)) and stop
//! listening on request. [`ServerAdapter`] and [`ServerHandle`] capture that.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wdom_core::errors::ServerError;
use wdom_settings::AdapterKind;

use crate::adapters::{AxumAdapter, TungsteniteAdapter};
use crate::state::LiveState;

/// A transport able to serve the document's WebSocket endpoint.
#[async_trait]
pub trait ServerAdapter: Send + Sync {
    /// Which transport this is.
    fn kind(&self) -> AdapterKind;

    /// Bind `address:port` and start accepting connections in the background.
    async fn listen(
        &self,
        state: Arc<LiveState>,
        address: &str,
        port: u16,
    ) -> Result<Arc<dyn ServerHandle>, ServerError>;
}

/// Control handle for a listening server.
pub trait ServerHandle: Send + Sync + fmt::Debug {
    /// Address the listener is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting connections. Idempotent.
    fn close(&self);

    /// Whether [`ServerHandle::close`] was called.
    fn is_closed(&self) -> bool;
}

/// The adapter implementing `kind`.
pub fn adapter_for(kind: AdapterKind) -> Box<dyn ServerAdapter> {
    match kind {
        AdapterKind::Axum => Box::new(AxumAdapter),
        AdapterKind::Tungstenite => Box::new(TungsteniteAdapter),
    }
}

/// [`ServerHandle`] backed by a cancellation token the accept loop watches.
#[derive(Debug)]
pub struct ListenerHandle {
    kind: AdapterKind,
    local_addr: SocketAddr,
    stop: CancellationToken,
}

impl ListenerHandle {
    /// Create a handle for a listener bound to `local_addr`.
    pub fn new(kind: AdapterKind, local_addr: SocketAddr) -> Self {
        Self {
            kind,
            local_addr,
            stop: CancellationToken::new(),
        }
    }

    /// Token cancelled by [`ServerHandle::close`].
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

impl ServerHandle for ListenerHandle {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn close(&self) {
        if !self.stop.is_cancelled() {
            info!(adapter = %self.kind, addr = %self.local_addr, "closing listener");
            self.stop.cancel();
        }
    }

    fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Bind a TCP listener, mapping failure to [`ServerError::Bind`].
pub(crate) async fn bind(address: &str, port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind((address, port))
        .await
        .map_err(|source| ServerError::Bind {
            address: format!("{address}:{port}"),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn adapter_for_each_kind() {
        assert_eq!(adapter_for(AdapterKind::Axum).kind(), AdapterKind::Axum);
        assert_eq!(
            adapter_for(AdapterKind::Tungstenite).kind(),
            AdapterKind::Tungstenite
        );
    }

    #[test]
    fn listener_handle_close_is_idempotent() {
        let handle = ListenerHandle::new(AdapterKind::Axum, "127.0.0.1:9".parse().unwrap());
        let token = handle.stop_token();
        assert!(!handle.is_closed());
        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert!(token.is_cancelled());
        assert_eq!(handle.local_addr().port(), 9);
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = bind("127.0.0.1", 0).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = bind("127.0.0.1", port).await.unwrap_err();
        assert_matches!(err, ServerError::Bind { ref address, .. } if address == &format!("127.0.0.1:{port}"));
    }
}
