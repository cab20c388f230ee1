//! WebSocket relay: server surface, per-connection drivers, message
//! engine and garbage collection

pub(crate) mod connection;
pub mod engine;
pub(crate) mod reaper;
pub mod server;

pub use server::{router, serve, serve_on, AppState};
