//! Connection management for client connections.
//!
//! This module tracks live sockets and owns their outbound queues. It knows
//! nothing about matches; identity binding lives in the coordinator.

pub mod client;
pub mod manager;

pub use client::{ClientConnection, OutboundQueue};
pub use manager::ConnectionManager;

/// Connection identifiers are shared with the coordinator.
pub use match_core::ConnectionId;
