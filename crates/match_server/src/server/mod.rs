//! Accept loop, per-connection tasks and server lifecycle.

pub mod core;
pub mod handlers;

pub use core::{MatchServer, ServerStats};
