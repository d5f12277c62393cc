//! WebSocket plumbing shared by every transport adapter.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | One browser's outbound channel and close signal |
//! | `registry` | Set of live connections |
//! | `message_loop` | Periodic batched broadcast of the outbound queue |
//! | `router` | Inbound `log` / `event` / `response` dispatch |
//! | `session` | Per-socket read/write loop |

pub mod connection;
pub mod message_loop;
pub mod registry;
pub mod router;
pub mod session;
