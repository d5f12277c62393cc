//! `LiveServer`: wires a document to a transport adapter and the message loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wdom_core::errors::ServerError;
use wdom_settings::WdomSettings;

use crate::adapter::{ServerAdapter, ServerHandle, adapter_for};
use crate::config::SyncConfig;
use crate::document::Document;
use crate::lifecycle::Lifecycle;
use crate::shutdown::ShutdownCoordinator;
use crate::state::LiveState;
use crate::websocket::message_loop::MessageLoop;

/// How long background tasks get to wind down in [`LiveServer::run`].
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves one [`Document`] to any number of browsers.
#[derive(Debug)]
pub struct LiveServer {
    config: SyncConfig,
    state: Arc<LiveState>,
    shutdown: Arc<ShutdownCoordinator>,
}

/// A started server: the listener handle plus its background tasks.
#[derive(Debug)]
pub struct RunningServer {
    handle: Arc<dyn ServerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// The listener's control handle.
    pub fn handle(&self) -> &Arc<dyn ServerHandle> {
        &self.handle
    }
}

impl LiveServer {
    /// Create a server for `document`. Pass a Prometheus handle to expose
    /// `/metrics` on the axum adapter.
    pub fn new(
        settings: &WdomSettings,
        document: Arc<Document>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let config = SyncConfig::from(settings);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let state = Arc::new(LiveState::new(
            document,
            config.clone(),
            shutdown.token(),
            metrics,
        ));
        Self {
            config,
            state,
            shutdown,
        }
    }

    /// The served document.
    pub fn document(&self) -> &Arc<Document> {
        &self.state.document
    }

    /// Connection lifecycle and auto-shutdown state.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.state.lifecycle
    }

    /// State shared with sessions.
    pub fn state(&self) -> &Arc<LiveState> {
        &self.state
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Resolved configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bind the configured adapter and start the message loop.
    pub async fn start(&self) -> Result<RunningServer, ServerError> {
        let adapter = adapter_for(self.config.adapter);
        let handle = adapter
            .listen(Arc::clone(&self.state), &self.config.address, self.config.port)
            .await?;
        self.state.lifecycle.attach_server(Arc::clone(&handle));

        let message_loop = MessageLoop::new(&self.state.document, self.config.message_wait)
            .spawn(self.shutdown.token());

        info!(
            adapter = %adapter.kind(),
            addr = %handle.local_addr(),
            ws_path = %self.config.ws_path,
            auto_shutdown = self.config.auto_shutdown,
            "live server started"
        );
        Ok(RunningServer {
            handle,
            tasks: vec![message_loop],
        })
    }

    /// Start, then serve until auto-shutdown fires or Ctrl-C arrives.
    pub async fn run(&self) -> Result<(), ServerError> {
        let running = self.start().await?;
        let token = self.shutdown.token();
        tokio::select! {
            () = token.cancelled() => info!("shutdown requested"),
            () = interrupted() => info!("interrupt received, shutting down"),
        }
        self.stop(running).await;
        Ok(())
    }

    /// Close the listener and wait for background tasks.
    ///
    /// After an auto-shutdown the lifecycle has already closed the listener.
    pub async fn stop(&self, running: RunningServer) {
        if !self.state.lifecycle.is_terminated() {
            running.handle.close();
        }
        self.shutdown
            .graceful_shutdown(running.tasks, Some(DRAIN_TIMEOUT))
            .await;
        info!("live server stopped");
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
