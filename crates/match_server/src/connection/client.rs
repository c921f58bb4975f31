//! Client connection representation.
//!
//! Every connection owns an unbounded outbound queue. Producers push frames
//! with [`ClientConnection::queue`] without ever blocking; the connection's
//! writer task drains the matching [`OutboundQueue`] into the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Represents an individual client connection to the server.
///
/// # Fields
///
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was established
#[derive(Debug)]
pub struct ClientConnection {
    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    sender: mpsc::UnboundedSender<Message>,
    pending: Arc<AtomicUsize>,
}

/// Receiving half of a connection's outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::UnboundedReceiver<Message>,
    pending: Arc<AtomicUsize>,
}

impl ClientConnection {
    /// Creates a connection record and its outbound queue.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    ///
    /// # Returns
    ///
    /// The connection record and the queue its writer task should drain.
    pub fn new(remote_addr: SocketAddr) -> (Self, OutboundQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let connection = Self {
            remote_addr,
            connected_at: SystemTime::now(),
            sender,
            pending: pending.clone(),
        };
        (connection, OutboundQueue { receiver, pending })
    }

    /// Queues a frame for this connection.
    ///
    /// # Returns
    ///
    /// The number of frames now waiting, or `None` if the writer is gone.
    pub fn queue(&self, message: Message) -> Option<usize> {
        let waiting = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if self.sender.send(message).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        Some(waiting)
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

impl OutboundQueue {
    /// Waits for the next frame to write. `None` once the connection record
    /// has been dropped and the queue is drained.
    pub async fn next(&mut self) -> Option<Message> {
        let message = self.receiver.recv().await?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_tracks_pending_frames() {
        let (connection, mut queue) = ClientConnection::new("127.0.0.1:4000".parse().unwrap());

        assert_eq!(connection.queue(Message::Text("a".into())), Some(1));
        assert_eq!(connection.queue(Message::Text("b".into())), Some(2));
        assert_eq!(connection.pending(), 2);

        assert_eq!(queue.next().await, Some(Message::Text("a".into())));
        assert_eq!(connection.pending(), 1);
    }

    #[tokio::test]
    async fn test_queue_after_writer_dropped() {
        let (connection, queue) = ClientConnection::new("127.0.0.1:4000".parse().unwrap());
        drop(queue);

        assert_eq!(connection.queue(Message::Text("late".into())), None);
        assert_eq!(connection.pending(), 0);
    }
}
