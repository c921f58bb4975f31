//! Delivery seam between the coordinator and the transport.

use crate::model::ConnectionId;
use crate::protocol::ServerMessage;

/// Queues messages for individual connections.
///
/// `deliver` is called while the addressed match is locked, so
/// implementations must not block or await. Delivering to a connection that
/// no longer exists is silently dropped.
pub trait Outbox: Send + Sync {
    fn deliver(&self, connection: ConnectionId, message: &ServerMessage);
}

/// Outbox that discards everything. Useful when only return values matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutbox;

impl Outbox for NullOutbox {
    fn deliver(&self, _connection: ConnectionId, _message: &ServerMessage) {}
}
