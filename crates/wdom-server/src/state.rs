//! State shared by every transport adapter and session.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::document::Document;
use crate::lifecycle::Lifecycle;
use crate::websocket::router::InboundRouter;

/// Everything a session needs, shared as `Arc<LiveState>`.
pub struct LiveState {
    /// The one document being served.
    pub document: Arc<Document>,
    /// Inbound frame dispatch.
    pub router: InboundRouter,
    /// Connect/disconnect bookkeeping and auto-shutdown.
    pub lifecycle: Arc<Lifecycle>,
    /// Resolved runtime configuration.
    pub config: SyncConfig,
    /// Cancelled when the server stops.
    pub shutdown: CancellationToken,
    /// When the server was created.
    pub start_time: Instant,
    /// Renders `/metrics` when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl LiveState {
    /// Wire up state for `document`.
    pub fn new(
        document: Arc<Document>,
        config: SyncConfig,
        shutdown: CancellationToken,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let lifecycle = Arc::new(Lifecycle::new(
            Arc::clone(document.registry()),
            config.auto_shutdown,
            config.shutdown_wait,
            shutdown.clone(),
        ));
        Self {
            router: InboundRouter::new(Arc::clone(&document)),
            document,
            lifecycle,
            config,
            shutdown,
            start_time: Instant::now(),
            metrics,
        }
    }
}

impl fmt::Debug for LiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveState")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle.state())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
