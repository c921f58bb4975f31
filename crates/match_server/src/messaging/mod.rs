//! Message parsing and routing between sockets and the coordinator.

pub mod router;
pub mod types;

pub use router::route_client_message;
pub use types::ClientMessage;
