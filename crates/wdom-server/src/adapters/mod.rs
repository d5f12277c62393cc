//! Concrete transports behind [`ServerAdapter`](crate::adapter::ServerAdapter).

pub mod axum;
pub mod tungstenite;

pub use self::axum::AxumAdapter;
pub use self::tungstenite::TungsteniteAdapter;
