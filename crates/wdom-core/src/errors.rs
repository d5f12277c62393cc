//! Error taxonomy for the live document core.
//!
//! - [`SyncError`]: every failure the synchronization core can observe, from
//!   malformed inbound frames to broken client connections. Most variants are
//!   recovered locally by the component that sees them; only
//!   [`SyncError::DuplicateConnection`] indicates a programming bug.
//! - [`ServerError`]: failures at the transport adapter boundary (bind, accept).

use thiserror::Error;

use crate::ids::{ConnectionId, ElementId, RequestId};

/// Errors produced by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Inbound frame is not JSON, not an object, or lacks a known `type`.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// What was wrong with the frame.
        reason: String,
    },

    /// An event referenced an element that is no longer in the tree.
    #[error("unknown event target: {target}")]
    UnknownTarget {
        /// The element ID the client reported.
        target: ElementId,
    },

    /// A response referenced a request that is not pending.
    #[error("no pending request: {request_id}")]
    StaleResponse {
        /// The request ID the client reported.
        request_id: RequestId,
    },

    /// Write to a connection whose peer is gone.
    #[error("connection closed: {connection_id}")]
    ConnectionClosed {
        /// The dead connection.
        connection_id: ConnectionId,
    },

    /// Write to a connection whose outbound buffer is full.
    #[error("connection outbound buffer full: {connection_id}")]
    Backpressure {
        /// The slow connection.
        connection_id: ConnectionId,
    },

    /// The same connection identity was registered twice.
    #[error("connection already registered: {connection_id}")]
    DuplicateConnection {
        /// The duplicated connection.
        connection_id: ConnectionId,
    },

    /// The document has shut down and accepts no new connections.
    #[error("document terminated")]
    Terminated,

    /// A pending request was abandoned before the client answered.
    #[error("request dropped before a response arrived: {request_id}")]
    RequestDropped {
        /// The abandoned request.
        request_id: RequestId,
    },
}

impl SyncError {
    /// Stable machine-readable code, used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::UnknownTarget { .. } => "UNKNOWN_TARGET",
            Self::StaleResponse { .. } => "STALE_RESPONSE",
            Self::ConnectionClosed { .. } => "CONNECTION_CLOSED",
            Self::Backpressure { .. } => "BACKPRESSURE",
            Self::DuplicateConnection { .. } => "DUPLICATE_CONNECTION",
            Self::Terminated => "TERMINATED",
            Self::RequestDropped { .. } => "REQUEST_DROPPED",
        }
    }

    /// Build a [`SyncError::MalformedMessage`] from anything displayable.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::MalformedMessage {
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the connection should be dropped from the registry.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::Backpressure { .. }
        )
    }
}

/// Errors raised by a transport adapter.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The `host:port` that was requested.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other socket-level failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
