//! Runtime configuration derived from [`WdomSettings`].

use std::time::Duration;

use wdom_settings::{AdapterKind, WdomSettings};

/// Settings resolved into the types the runtime consumes.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Bind address.
    pub address: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Transport adapter.
    pub adapter: AdapterKind,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Pause between queue flushes.
    pub message_wait: Duration,
    /// Stop once the last browser disconnects.
    pub auto_shutdown: bool,
    /// Grace period before an auto-shutdown.
    pub shutdown_wait: Duration,
    /// Per-connection outbound frame buffer.
    pub outbound_buffer: usize,
}

impl From<&WdomSettings> for SyncConfig {
    fn from(settings: &WdomSettings) -> Self {
        Self {
            address: settings.server.address.clone(),
            port: settings.server.port,
            adapter: settings.server.adapter,
            ws_path: settings.server.ws_path.clone(),
            max_message_size: settings.server.max_message_size,
            message_wait: Duration::from_millis(settings.sync.message_wait_ms.max(1)),
            auto_shutdown: settings.sync.auto_shutdown,
            shutdown_wait: Duration::from_millis(settings.sync.shutdown_wait_ms),
            outbound_buffer: settings.sync.outbound_buffer.max(1),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&WdomSettings::default())
    }
}
