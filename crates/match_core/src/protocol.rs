//! Wire protocol for match coordination.
//!
//! Every frame exchanged with a client is a JSON envelope of the form
//! `{"event": "<name>", "data": {...}}`. Inbound envelopes are decoded into
//! [`InboundEvent`] by [`InboundEvent::parse`]; outbound results are
//! [`ServerMessage`] values which serialize straight into the same envelope.
//!
//! Payload keys are camelCase. A few legacy aliases are accepted on input
//! (`identity` for `userId`, `userName` for `displayName`, `userEmail` for
//! `email`).

use crate::engine::AppliedMove;
use crate::model::{Color, Finished, Identity, MatchId, MatchStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while decoding an inbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Identity fields shared by `create-match` and `join-match`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityPayload {
    #[serde(alias = "identity")]
    pub user_id: Option<String>,
    #[serde(alias = "userName")]
    pub display_name: Option<String>,
    #[serde(alias = "userEmail")]
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl From<IdentityPayload> for Identity {
    fn from(payload: IdentityPayload) -> Self {
        Identity {
            user_id: payload.user_id,
            display_name: payload.display_name,
            email: payload.email,
            avatar: payload.avatar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub match_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub match_id: MatchId,
    #[serde(flatten)]
    pub identity: IdentityPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinRequest {
    pub match_id: MatchId,
    #[serde(alias = "identity")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub match_id: MatchId,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub promotion: Option<String>,
}

impl MoveRequest {
    /// First letter of the requested promotion piece, lowercased.
    pub fn promotion_letter(&self) -> Option<char> {
        self.promotion
            .as_deref()
            .and_then(|p| p.trim().chars().next())
            .map(|c| c.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResponse {
    pub match_id: MatchId,
    pub accept: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelRequest {
    pub match_id: Option<MatchId>,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    CreateMatch(IdentityPayload),
    GetMatch(MatchRequest),
    JoinMatch(JoinRequest),
    RejoinMatch(RejoinRequest),
    StartMatch(MatchRequest),
    ChessMove(MoveRequest),
    OfferDraw(MatchRequest),
    RespondDraw(DrawResponse),
    Resign(MatchRequest),
    CancelMatch(CancelRequest),
}

impl InboundEvent {
    /// Decodes an event name and its JSON payload.
    ///
    /// # Arguments
    ///
    /// * `event` - The envelope's event name, e.g. `chess-move`
    /// * `data` - The envelope's payload; `null` is treated as `{}`
    ///
    /// # Returns
    ///
    /// The typed request, or a [`ProtocolError`] when the event is unknown or
    /// its payload does not match the expected shape.
    pub fn parse(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let data = if data.is_null() { Value::Object(Default::default()) } else { data };

        fn decode<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
            serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
                event: event.to_string(),
                source,
            })
        }

        let parsed = match event {
            "create-match" => InboundEvent::CreateMatch(decode(event, data)?),
            "get-match" => InboundEvent::GetMatch(decode(event, data)?),
            "join-match" => InboundEvent::JoinMatch(decode(event, data)?),
            "rejoin-match" => InboundEvent::RejoinMatch(decode(event, data)?),
            "start-match" => InboundEvent::StartMatch(decode(event, data)?),
            "chess-move" => InboundEvent::ChessMove(decode(event, data)?),
            "offer-draw" => InboundEvent::OfferDraw(decode(event, data)?),
            "respond-draw" => InboundEvent::RespondDraw(decode(event, data)?),
            "resign" => InboundEvent::Resign(decode(event, data)?),
            "cancel_match" | "cancel-match" => InboundEvent::CancelMatch(decode(event, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(parsed)
    }

    /// Protocol name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::CreateMatch(_) => "create-match",
            InboundEvent::GetMatch(_) => "get-match",
            InboundEvent::JoinMatch(_) => "join-match",
            InboundEvent::RejoinMatch(_) => "rejoin-match",
            InboundEvent::StartMatch(_) => "start-match",
            InboundEvent::ChessMove(_) => "chess-move",
            InboundEvent::OfferDraw(_) => "offer-draw",
            InboundEvent::RespondDraw(_) => "respond-draw",
            InboundEvent::Resign(_) => "resign",
            InboundEvent::CancelMatch(_) => "cancel_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: UserId,
    pub name: String,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub position: String,
    pub turn: Color,
    pub history: Vec<String>,
}

/// Lobby-level description of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: MatchId,
    pub status: MatchStatus,
    pub players: Vec<PlayerView>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub state: BoardView,
}

/// Authoritative game state after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStateView {
    pub match_id: MatchId,
    pub position: String,
    pub turn: Color,
    pub history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<AppliedMove>,
    pub status: MatchStatus,
    pub check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<Finished>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidMoveReason {
    NotYourTurn,
    IllegalMove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidMove {
    pub match_id: MatchId,
    pub reason: InvalidMoveReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOfferNotice {
    pub match_id: MatchId,
    pub from: Color,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRef {
    pub match_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub match_id: MatchId,
    pub player_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub reason: String,
}

/// A message addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    MatchCreated(MatchView),
    MatchFound(MatchView),
    MatchJoined(MatchView),
    MatchStarted(MatchView),
    MatchState(MatchStateView),
    InvalidMove(InvalidMove),
    DrawOffer(DrawOfferNotice),
    DrawDeclined(MatchRef),
    MatchExpired(MatchRef),
    MatchCancelled(MatchRef),
    MatchNotFound(MatchRef),
    MatchNotReady(MatchRef),
    MatchAlreadyStarted(MatchRef),
    MatchFull(MatchRef),
    SelfJoinBlocked(MatchRef),
    PlayerDisconnected(PlayerRef),
    PlayerReconnected(PlayerRef),
    OpponentLeft(PlayerRef),
    Unauthorized(Reason),
    InvalidMessage(Reason),
}

impl ServerMessage {
    /// Protocol event name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::MatchCreated(_) => "match-created",
            ServerMessage::MatchFound(_) => "match-found",
            ServerMessage::MatchJoined(_) => "match-joined",
            ServerMessage::MatchStarted(_) => "match-started",
            ServerMessage::MatchState(_) => "match-state",
            ServerMessage::InvalidMove(_) => "invalid-move",
            ServerMessage::DrawOffer(_) => "draw-offer",
            ServerMessage::DrawDeclined(_) => "draw-declined",
            ServerMessage::MatchExpired(_) => "match-expired",
            ServerMessage::MatchCancelled(_) => "match-cancelled",
            ServerMessage::MatchNotFound(_) => "match-not-found",
            ServerMessage::MatchNotReady(_) => "match-not-ready",
            ServerMessage::MatchAlreadyStarted(_) => "match-already-started",
            ServerMessage::MatchFull(_) => "match-full",
            ServerMessage::SelfJoinBlocked(_) => "self-join-blocked",
            ServerMessage::PlayerDisconnected(_) => "player-disconnected",
            ServerMessage::PlayerReconnected(_) => "player-reconnected",
            ServerMessage::OpponentLeft(_) => "opponent-left",
            ServerMessage::Unauthorized(_) => "unauthorized",
            ServerMessage::InvalidMessage(_) => "invalid-message",
        }
    }

    pub fn match_ref(match_id: &MatchId) -> MatchRef {
        MatchRef { match_id: match_id.clone() }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        ServerMessage::Unauthorized(Reason { reason: reason.into() })
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        ServerMessage::InvalidMessage(Reason { reason: reason.into() })
    }

    /// Serializes the message into its JSON envelope.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
