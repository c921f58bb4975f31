//! # Match Server - WebSocket Transport for Chess Matches
//!
//! Accepts client WebSocket connections, validates and decodes their JSON
//! frames, and hands the resulting requests to a
//! [`MatchCoordinator`](match_core::MatchCoordinator). Everything the
//! coordinator wants to say flows back through the [`ConnectionManager`]
//! which acts as its outbox.
//!
//! ## Message Flow
//!
//! 1. Client sends a text frame shaped `{"event": ..., "data": {...}}`
//! 2. The security layer checks size, rate and JSON shape
//! 3. The router decodes the envelope into a typed request
//! 4. The coordinator applies it under the match's lock
//! 5. Replies are queued per connection and written by the socket's writer task
//!
//! Frames that fail any step are answered with an `invalid-message` event;
//! the connection stays open.
//!
//! ## Configuration
//!
//! [`ServerConfig`] covers the bind address, connection limits, inbound
//! [`SecurityConfig`] limits and the match timings.
//!
//! ## Error Handling
//!
//! [`ServerError`] separates network failures from protocol and internal
//! problems. Match-level rejections are never errors here; they are sent to
//! the requesting client.

pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod security;
pub mod server;
pub mod utils;

pub use config::{SecurityConfig, ServerConfig};
pub use connection::ConnectionManager;
pub use error::ServerError;
pub use server::{MatchServer, ServerStats};
pub use utils::{create_server, create_server_with_config};
