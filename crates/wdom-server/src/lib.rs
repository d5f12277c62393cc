//! # wdom-server
//!
//! Keeps server-side DOM elements in sync with the browsers viewing them.
//!
//! - `document`: element tree, outbound queue, pending client queries
//! - `websocket`: connection registry, batched broadcast loop, inbound
//!   routing, per-socket sessions
//! - `lifecycle`: connect/disconnect tracking and auto-shutdown
//! - `adapter` / `adapters`: transport boundary with axum and bare
//!   tokio-tungstenite implementations
//! - `server`: [`LiveServer`] wiring it all together

#![deny(unsafe_code)]

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod document;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use adapter::{ServerAdapter, ServerHandle, adapter_for};
pub use config::SyncConfig;
pub use document::{Document, DomEvent, Element};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use server::{LiveServer, RunningServer};
