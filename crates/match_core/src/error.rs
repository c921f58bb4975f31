//! Error types for match coordination.
//!
//! Every rejection the lifecycle controller can produce is a [`MatchError`].
//! Rejections are terminal to the single request that caused them and are
//! reported to the requesting connection only, via [`MatchError::to_message`].

use crate::model::MatchId;
use crate::protocol::{InvalidMove, InvalidMoveReason, ServerMessage};

/// Rejection of a lifecycle request.
///
/// Variants are grouped the way clients react to them: identity problems,
/// unknown matches, state conflicts, rule violations and temporal endings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Missing identity, or the requester is not allowed to act on the match
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No live match with this id
    #[error("match {0} not found")]
    NotFound(MatchId),

    /// The match expired or was cancelled before it could be joined
    #[error("match {0} expired")]
    Expired(MatchId),

    #[error("match {0} already started")]
    AlreadyStarted(MatchId),

    #[error("match {0} is not ready to start")]
    NotReady(MatchId),

    #[error("match {0} is full")]
    Full(MatchId),

    #[error("cannot join own match {0}")]
    SelfJoin(MatchId),

    /// Move rejected without touching the position
    #[error("invalid move in match {match_id}: {detail}")]
    InvalidMove {
        match_id: MatchId,
        reason: InvalidMoveReason,
        detail: String,
    },
}

impl MatchError {
    /// Converts the rejection into the message sent back to the requester.
    pub fn to_message(&self) -> ServerMessage {
        match self {
            MatchError::Unauthorized(reason) => ServerMessage::unauthorized(reason.clone()),
            MatchError::NotFound(id) => ServerMessage::MatchNotFound(ServerMessage::match_ref(id)),
            MatchError::Expired(id) => ServerMessage::MatchExpired(ServerMessage::match_ref(id)),
            MatchError::AlreadyStarted(id) => {
                ServerMessage::MatchAlreadyStarted(ServerMessage::match_ref(id))
            }
            MatchError::NotReady(id) => ServerMessage::MatchNotReady(ServerMessage::match_ref(id)),
            MatchError::Full(id) => ServerMessage::MatchFull(ServerMessage::match_ref(id)),
            MatchError::SelfJoin(id) => ServerMessage::SelfJoinBlocked(ServerMessage::match_ref(id)),
            MatchError::InvalidMove { match_id, reason, detail } => {
                ServerMessage::InvalidMove(InvalidMove {
                    match_id: match_id.clone(),
                    reason: *reason,
                    detail: detail.clone(),
                })
            }
        }
    }

    pub(crate) fn not_your_turn(match_id: &MatchId, to_move: crate::model::Color) -> Self {
        MatchError::InvalidMove {
            match_id: match_id.clone(),
            reason: InvalidMoveReason::NotYourTurn,
            detail: format!("{to_move} to move"),
        }
    }

    pub(crate) fn illegal_move(match_id: &MatchId, detail: impl Into<String>) -> Self {
        MatchError::InvalidMove {
            match_id: match_id.clone(),
            reason: InvalidMoveReason::IllegalMove,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Color;

    #[test]
    fn test_rejections_map_to_protocol_events() {
        let id = MatchId::from("m1");
        let cases = [
            (MatchError::Unauthorized("missing identity".into()), "unauthorized"),
            (MatchError::NotFound(id.clone()), "match-not-found"),
            (MatchError::Expired(id.clone()), "match-expired"),
            (MatchError::AlreadyStarted(id.clone()), "match-already-started"),
            (MatchError::NotReady(id.clone()), "match-not-ready"),
            (MatchError::Full(id.clone()), "match-full"),
            (MatchError::SelfJoin(id.clone()), "self-join-blocked"),
            (MatchError::not_your_turn(&id, Color::Black), "invalid-move"),
        ];

        for (error, event) in cases {
            assert_eq!(error.to_message().event_name(), event, "{error}");
        }
    }

    #[test]
    fn test_invalid_move_carries_reason() {
        let error = MatchError::illegal_move(&MatchId::from("m1"), "illegal move: e2e5");
        match error.to_message() {
            ServerMessage::InvalidMove(detail) => {
                assert_eq!(detail.reason, InvalidMoveReason::IllegalMove);
                assert_eq!(detail.detail, "illegal move: e2e5");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
