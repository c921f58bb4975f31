//! Connection handling logic for WebSocket clients.
//!
//! One task per socket runs two halves concurrently: the reader validates
//! and routes incoming frames, the writer drains the connection's outbound
//! queue. When either half ends the coordinator is told about the
//! disconnect and the connection record is dropped.

use crate::{
    connection::ConnectionManager,
    error::ServerError,
    messaging::route_client_message,
    security::SecurityManager,
};
use futures::{SinkExt, StreamExt};
use match_core::{MatchCoordinator, Outbox, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, trace, warn};

/// Handles a single client connection from handshake to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register connection with the connection manager
/// 3. Run the reader and writer halves until either ends
/// 4. Report the disconnect to the coordinator
/// 5. Drop the connection record
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `coordinator` - The match coordinator frames are routed to
/// * `connection_manager` - Manager for tracking connections
/// * `security` - Frame validation and rate limiting
///
/// # Returns
///
/// `Ok(())` when the connection ended normally, or a `ServerError` if the
/// handshake failed.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<MatchCoordinator>,
    connection_manager: Arc<ConnectionManager>,
    security: Arc<SecurityManager>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (connection_id, mut outbound) = connection_manager.add_connection(addr);

    // Writer half: flushes queued frames in order
    let outgoing_task = async move {
        while let Some(message) = outbound.next().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = ws_sender.send(message).await {
                error!("Failed to send frame to connection {}: {}", connection_id, e);
                break;
            }
            if closing {
                break;
            }
        }
    };

    // Reader half: validates and routes client frames
    let incoming_task = {
        let connection_manager = connection_manager.clone();
        let coordinator = coordinator.clone();
        let security = security.clone();
        let max_name_chars = security.config().max_string_length;

        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = security.validate_message(addr.ip(), text.as_bytes()).await {
                            warn!("🛡️ Rejected frame from connection {}: {}", connection_id, e);
                            connection_manager.deliver(connection_id, &ServerMessage::invalid_message(e.to_string()));
                            continue;
                        }
                        if let Err(e) =
                            route_client_message(&text, connection_id, &coordinator, max_name_chars).await
                        {
                            warn!("❌ Message routing error on connection {}: {}", connection_id, e);
                            connection_manager.deliver(connection_id, &ServerMessage::invalid_message(e.to_string()));
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        connection_manager.deliver(
                            connection_id,
                            &ServerMessage::invalid_message("binary frames are not supported"),
                        );
                    }
                    Ok(Message::Ping(data)) => {
                        connection_manager.send_to_connection(connection_id, Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client {} requested close", connection_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                    _ => trace!("Ignoring control frame on connection {}", connection_id),
                }
            }
        }
    };

    // Run both halves until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    coordinator.on_disconnect(connection_id).await;
    connection_manager.remove_connection(connection_id);
    Ok(())
}
