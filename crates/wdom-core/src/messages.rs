//! JSON wire messages exchanged with the browser.
//!
//! Server → client traffic is always a batch: a JSON array of
//! [`OutboundMessage`] objects, each tagged with `type`.
//!
//! Client → server traffic is one [`InboundMessage`] per frame. Inbound
//! frames are untrusted, so they are parsed in two steps: first into a JSON
//! object, then by branching on the `type` discriminant. Anything that does
//! not fit lands in [`SyncError::MalformedMessage`] instead of panicking.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SyncError;
use crate::ids::{ElementId, RequestId};

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// One client-visible change produced by the document model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Apply a DOM mutation to the mirrored element.
    Dom {
        /// Element to mutate.
        target: ElementId,
        /// Mutation name, e.g. `setAttribute`.
        method: String,
        /// Positional arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<Value>,
    },

    /// Ask the client to evaluate `method` on `target` and answer with a
    /// `response` carrying the same `request_id`.
    Query {
        /// Correlation ID for the client's answer.
        request_id: RequestId,
        /// Element to query.
        target: ElementId,
        /// Method to evaluate.
        method: String,
        /// Positional arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<Value>,
    },
}

impl OutboundMessage {
    /// Build a DOM mutation message.
    pub fn dom(target: ElementId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Dom {
            target,
            method: method.into(),
            params,
        }
    }

    /// Element this message is addressed to.
    pub fn target(&self) -> &ElementId {
        match self {
            Self::Dom { target, .. } | Self::Query { target, .. } => target,
        }
    }
}

/// Serialize a drained batch as one JSON array frame.
pub fn encode_batch(batch: &[OutboundMessage]) -> Result<String, serde_json::Error> {
    serde_json::to_string(batch)
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// A message received from a browser connection.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Client-side log line to forward to the process log.
    Log(LogMessage),
    /// DOM event observed on a mirrored element.
    Event(EventMessage),
    /// Answer to an earlier [`OutboundMessage::Query`].
    Response(ResponseMessage),
}

impl InboundMessage {
    /// Parse one raw text frame.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_str(raw).map_err(SyncError::malformed)?;
        let Value::Object(mut fields) = value else {
            return Err(SyncError::malformed("expected a JSON object"));
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(SyncError::malformed("field `type` must be a string")),
            None => return Err(SyncError::malformed("missing field `type`")),
        };
        let payload = Value::Object(fields);

        match kind.as_str() {
            "log" => decode(payload, &kind).map(Self::Log),
            "event" => decode(payload, &kind).map(Self::Event),
            "response" => decode(payload, &kind).map(Self::Response),
            other => Err(SyncError::malformed(format!(
                "unknown message type `{other}`"
            ))),
        }
    }

    /// The wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Event(_) => "event",
            Self::Response(_) => "response",
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value, kind: &str) -> Result<T, SyncError> {
    serde_json::from_value(payload).map_err(|e| SyncError::malformed(format!("{kind}: {e}")))
}

/// Payload of a `log` message.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LogMessage {
    /// Level label as sent by the browser (`info`, `warning`, ...).
    #[serde(default)]
    pub level: Option<String>,
    /// Log text.
    #[serde(default)]
    pub message: Option<String>,
}

impl LogMessage {
    /// Parsed level; unknown or missing labels map to [`ClientLogLevel::Info`].
    pub fn level(&self) -> ClientLogLevel {
        self.level
            .as_deref()
            .map_or(ClientLogLevel::Info, ClientLogLevel::from_label)
    }

    /// Log text, empty when absent.
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Severity of a browser log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientLogLevel {
    /// `trace`
    Trace,
    /// `debug`
    Debug,
    /// `info`, and anything unrecognized
    Info,
    /// `warn` / `warning`
    Warn,
    /// `error` / `critical` / `fatal`
    Error,
}

impl ClientLogLevel {
    /// Map a browser label (case-insensitive) to a level.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" | "critical" | "fatal" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Payload of an `event` message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct EventMessage {
    /// Element the event fired on.
    pub target: ElementId,
    /// DOM event type, e.g. `click`.
    #[serde(default)]
    pub event: String,
    /// Remaining event-specific fields.
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

/// Payload of a `response` message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ResponseMessage {
    /// Request this answers.
    #[serde(alias = "reqid")]
    pub request_id: RequestId,
    /// Value computed by the client.
    #[serde(default, alias = "data")]
    pub value: Value,
}
