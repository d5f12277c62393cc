//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may contain any subset of fields; missing ones keep their default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings type for the wdom server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WdomSettings {
    /// Network and transport settings.
    pub server: ServerSettings,
    /// Message loop and lifecycle timing.
    pub sync: SyncSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl WdomSettings {
    /// Clamp out-of-range values and fix invalid invariants.
    ///
    /// Called automatically during loading. Bad values are corrected with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        if self.sync.message_wait_ms == 0 {
            tracing::warn!("messageWaitMs must be at least 1, correcting");
            self.sync.message_wait_ms = 1;
        }
        if self.sync.outbound_buffer == 0 {
            tracing::warn!("outboundBuffer must be at least 1, correcting");
            self.sync.outbound_buffer = 1;
        }
        if !self.server.ws_path.starts_with('/') {
            tracing::warn!(ws_path = %self.server.ws_path, "wsPath must start with '/', correcting");
            self.server.ws_path.insert(0, '/');
        }
    }
}

/// Which transport adapter serves the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Axum HTTP server with WebSocket upgrade, `/health` and `/metrics`.
    #[default]
    Axum,
    /// Bare `tokio-tungstenite` accept loop.
    Tungstenite,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Axum => "axum",
            Self::Tungstenite => "tungstenite",
        })
    }
}

impl FromStr for AdapterKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axum" => Ok(Self::Axum),
            "tungstenite" => Ok(Self::Tungstenite),
            other => Err(SettingsError::InvalidValue(format!("adapter `{other}`"))),
        }
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
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
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 8888,
            adapter: AdapterKind::Axum,
            ws_path: "/rimo_ws".to_string(),
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// Message loop and connection lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Pause between outbound queue flushes, in milliseconds.
    pub message_wait_ms: u64,
    /// Stop the server once the last browser disconnects.
    pub auto_shutdown: bool,
    /// Grace period before an auto-shutdown, in milliseconds.
    pub shutdown_wait_ms: u64,
    /// Per-connection outbound frame buffer.
    pub outbound_buffer: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            message_wait_ms: 5,
            auto_shutdown: false,
            shutdown_wait_ms: 1000,
            outbound_buffer: 1024,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
