//! Envelope type for client frames.

use serde::{Deserialize, Serialize};

/// A frame sent from a client to the server.
///
/// # Examples
///
/// ```json
/// {
///   "event": "chess-move",
///   "data": { "matchId": "Xy12Ab34Cd56", "from": "e2", "to": "e4" }
/// }
/// ```
///
/// `data` may be omitted for events without a payload, such as `cancel_match`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// The protocol event name
    pub event: String,

    /// The event payload
    #[serde(default)]
    pub data: serde_json::Value,
}
