//! Connection manager for tracking client connections.
//!
//! This module provides the central registry of live sockets, assigns
//! connection ids, and implements the coordinator's [`Outbox`] by
//! serializing each message once and queueing it on the target socket.

use super::client::{ClientConnection, OutboundQueue};
use super::ConnectionId;
use dashmap::DashMap;
use match_core::{Outbox, ServerMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Central manager for all client connections.
///
/// # Architecture
///
/// * Uses a `DashMap` so queueing never waits on an async lock
/// * Implements atomic connection ID generation
/// * Every connection has its own unbounded outbound queue
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: DashMap<ConnectionId, ClientConnection>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,

    /// Pending frame count above which a slow consumer is reported
    outbound_queue_warn: usize,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// # Arguments
    ///
    /// * `outbound_queue_warn` - Queue depth that triggers a warning
    pub fn new(outbound_queue_warn: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicUsize::new(1),
            outbound_queue_warn,
        }
    }

    /// Adds a new connection and returns its unique ID.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    ///
    /// # Returns
    ///
    /// The assigned `ConnectionId` and the outbound queue for its writer task.
    pub fn add_connection(&self, remote_addr: SocketAddr) -> (ConnectionId, OutboundQueue) {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, queue) = ClientConnection::new(remote_addr);
        self.connections.insert(connection_id, connection);
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        (connection_id, queue)
    }

    /// Removes a connection from the manager.
    ///
    /// Dropping the record closes its outbound queue, which ends the writer
    /// task once the remaining frames are flushed.
    pub fn remove_connection(&self, connection_id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&connection_id) {
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
        }
    }

    /// Queues a raw frame for a connection.
    ///
    /// # Returns
    ///
    /// `true` if the connection exists and its writer is still running.
    pub fn send_to_connection(&self, connection_id: ConnectionId, message: Message) -> bool {
        let Some(connection) = self.connections.get(&connection_id) else {
            debug!("Dropping frame for unknown connection {}", connection_id);
            return false;
        };
        match connection.queue(message) {
            Some(waiting) => {
                if waiting > self.outbound_queue_warn {
                    warn!(
                        "🐢 Connection {} has {} frames queued (threshold {})",
                        connection_id, waiting, self.outbound_queue_warn
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Asks a connection to close by queueing a close frame behind its
    /// pending messages.
    pub fn kick_connection(&self, connection_id: ConnectionId, reason: &str) -> bool {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: reason.to_string().into(),
        }));
        self.send_to_connection(connection_id, close)
    }

    /// Closes every live connection.
    ///
    /// # Returns
    ///
    /// The number of connections a close frame was queued for.
    pub fn kick_all(&self, reason: &str) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        let kicked = ids
            .into_iter()
            .filter(|id| self.kick_connection(*id, reason))
            .count();
        info!("👋 Closing {} connection(s): {}", kicked, reason);
        kicked
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Outbox for ConnectionManager {
    fn deliver(&self, connection: ConnectionId, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => {
                self.send_to_connection(connection, Message::Text(json.into()));
            }
            Err(e) => error!(
                "Failed to serialize '{}' for connection {}: {}",
                message.event_name(),
                connection,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let manager = ConnectionManager::new(16);
        let (first, _q1) = manager.add_connection(addr());
        let (second, _q2) = manager.add_connection(addr());

        assert_ne!(first, second);
        assert_eq!(manager.connection_count(), 2);

        manager.remove_connection(first);
        assert_eq!(manager.connection_count(), 1);
        assert!(!manager.send_to_connection(first, Message::Pong(Default::default())));
        assert!(manager.send_to_connection(second, Message::Pong(Default::default())));
    }

    #[tokio::test]
    async fn test_deliver_serializes_envelope() {
        let manager = ConnectionManager::new(16);
        let (id, mut queue) = manager.add_connection(addr());

        manager.deliver(id, &ServerMessage::unauthorized("missing identity"));

        match queue.next().await {
            Some(Message::Text(text)) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["event"], "unauthorized");
                assert_eq!(value["data"]["reason"], "missing identity");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delivery_to_unknown_connection_is_dropped() {
        let manager = ConnectionManager::new(16);
        assert!(!manager.send_to_connection(99, Message::Text("x".into())));
        manager.deliver(99, &ServerMessage::invalid_message("ignored"));
    }

    #[tokio::test]
    async fn test_kick_all_queues_close_frames() {
        let manager = ConnectionManager::new(16);
        let (_, mut q1) = manager.add_connection(addr());
        let (_, mut q2) = manager.add_connection(addr());

        assert_eq!(manager.kick_all("shutting down"), 2);
        assert!(matches!(q1.next().await, Some(Message::Close(Some(_)))));
        assert!(matches!(q2.next().await, Some(Message::Close(Some(_)))));
    }
}
