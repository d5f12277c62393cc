//! # wdom-core
//!
//! Foundation types for the wdom live document core.
//!
//! This crate provides the shared vocabulary that the other wdom crates depend on:
//!
//! - **Branded IDs**: [`ids::ConnectionId`], [`ids::ElementId`], [`ids::RequestId`] as newtypes
//! - **Errors**: [`errors::SyncError`] taxonomy and [`errors::ServerError`] via `thiserror`
//! - **Wire messages**: [`messages::OutboundMessage`] batches and [`messages::InboundMessage`] routing
//! - **Logging**: [`logging::init_subscriber`] and the [`logging::capture_logs`] test helper
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `wdom-server`.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
