//! Match and player entities.
//!
//! This module defines the in-memory representation of a match together with
//! the identifiers used to address matches, users and transport connections.
//! A [`Match`] owns its rules engine once play begins; every client-visible
//! field describing the board is a cache refreshed from that engine.

use crate::engine::{AppliedMove, DrawReason, RulesEngine};
use crate::protocol::{BoardView, MatchStateView, MatchView, PlayerView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FEN of the standard starting position, used before an engine exists.
pub const INITIAL_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Type alias for transport connection identifiers.
///
/// Connection IDs are handed out by the transport layer and are only
/// meaningful for the lifetime of a single socket.
pub type ConnectionId = usize;

/// Short, URL-safe identifier of a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable, provider-issued identity of a user. Survives reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Returns the other side.
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Seat index of this color in [`Match::players`].
    pub fn seat(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("white"),
            Color::Black => f.write_str("black"),
        }
    }
}

/// Lifecycle state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Created by the host, waiting for an opponent.
    Pending,
    /// Both seats taken, waiting for the start request.
    Ready,
    /// Play in progress.
    Started,
    /// Game over; retained until eviction.
    Finished,
    /// Cancelled or expired; about to be removed.
    Cancelled,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Checkmate,
    Draw,
    Resignation,
}

/// Terminal descriptor attached to a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finished {
    pub result: GameResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DrawReason>,
}

impl Finished {
    pub fn checkmate(winner: Color) -> Self {
        Self { result: GameResult::Checkmate, winner: Some(winner), reason: None }
    }

    pub fn draw(reason: DrawReason) -> Self {
        Self { result: GameResult::Draw, winner: None, reason: Some(reason) }
    }

    pub fn resignation(winner: Color) -> Self {
        Self { result: GameResult::Resignation, winner: Some(winner), reason: None }
    }
}

/// Identity claims carried by a connection, as supplied by the auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl Identity {
    /// Returns the verified user id, or `None` when it is missing or blank.
    pub fn user(&self) -> Option<UserId> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(UserId::from)
    }

    /// Display name, falling back to the user id.
    pub fn name_or(&self, user: &UserId) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| user.0.clone())
    }
}

/// A seated participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub color: Color,
    /// Most recent connection this player was seen on.
    pub connection: ConnectionId,
}

impl Player {
    pub fn new(id: UserId, identity: &Identity, color: Color, connection: ConnectionId) -> Self {
        Self {
            name: identity.name_or(&id),
            id,
            email: identity.email.clone(),
            avatar: identity.avatar.clone(),
            color,
            connection,
        }
    }
}

/// One two-player game session.
///
/// Invariants maintained by the lifecycle controller:
///
/// * `players.len() <= 2`, `players[0]` is white and `players[1]` is black
/// * `engine` is `Some` iff `status` is `Started` or `Finished`
/// * `position`, `turn` and `history` mirror the engine after every mutation
#[derive(Debug)]
pub struct Match {
    pub id: MatchId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub players: Vec<Player>,
    pub position: String,
    pub turn: Color,
    pub history: Vec<String>,
    pub engine: Option<Box<dyn RulesEngine>>,
    pub last_move: Option<AppliedMove>,
    /// Side that has an outstanding draw offer.
    pub draw_offer: Option<Color>,
    pub finished: Option<Finished>,
    /// Set once the match has been taken out of the store. Handles obtained
    /// before removal must treat the match as unknown.
    pub removed: bool,
}

impl Match {
    /// Creates a pending match with the host seated as white.
    pub fn new(
        id: MatchId,
        host: Player,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            created_at,
            expires_at,
            status: MatchStatus::Pending,
            players: vec![Player { color: Color::White, ..host }],
            position: INITIAL_POSITION.to_string(),
            turn: Color::White,
            history: Vec::new(),
            engine: None,
            last_move: None,
            draw_offer: None,
            finished: None,
            removed: false,
        }
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.first()
    }

    pub fn joiner(&self) -> Option<&Player> {
        self.players.get(1)
    }

    pub fn player(&self, color: Color) -> Option<&Player> {
        self.players.get(color.seat())
    }

    /// Color of the player currently bound to `connection`, if any.
    pub fn color_of_connection(&self, connection: ConnectionId) -> Option<Color> {
        self.players
            .iter()
            .find(|p| p.connection == connection)
            .map(|p| p.color)
    }

    /// Connection of the opponent of `color`, if seated.
    pub fn opponent_connection(&self, color: Color) -> Option<ConnectionId> {
        self.player(color.opposite()).map(|p| p.connection)
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.players.iter().map(|p| p.connection).collect()
    }

    /// Whether a pending match has outlived its expiry timestamp.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Pending && self.expires_at.is_some_and(|at| now >= at)
    }

    /// Copies position, side to move and history out of the engine.
    pub fn refresh_from_engine(&mut self) {
        if let Some(engine) = self.engine.as_ref() {
            self.position = engine.serialize_position();
            self.turn = engine.side_to_move();
            self.history = engine.move_history();
        }
    }

    /// Marks the match finished with the given descriptor.
    pub fn finish(&mut self, finished: Finished) {
        self.status = MatchStatus::Finished;
        self.draw_offer = None;
        self.finished = Some(finished);
    }

    /// Lobby view sent with `match-created`, `match-joined` and friends.
    pub fn view(&self) -> MatchView {
        MatchView {
            id: self.id.clone(),
            status: self.status,
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    color: p.color,
                    avatar: p.avatar.clone(),
                })
                .collect(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            state: BoardView {
                position: self.position.clone(),
                turn: self.turn,
                history: self.history.clone(),
            },
        }
    }

    /// Authoritative game state sent with `match-state`.
    pub fn state_view(&self) -> MatchStateView {
        MatchStateView {
            match_id: self.id.clone(),
            position: self.position.clone(),
            turn: self.turn,
            history: self.history.clone(),
            last_move: self.last_move.clone(),
            status: self.status,
            check: self.engine.as_ref().is_some_and(|e| e.is_check()),
            finished: self.finished.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, name: &str) -> Identity {
        Identity {
            user_id: Some(id.to_string()),
            display_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_rejects_blank_user() {
        let blank = Identity { user_id: Some("   ".into()), ..Default::default() };
        assert!(blank.user().is_none());
        assert!(Identity::default().user().is_none());
        assert_eq!(identity("u1", "Ann").user(), Some(UserId::from("u1")));
    }

    #[test]
    fn test_display_name_falls_back_to_user_id() {
        let id = Identity { user_id: Some("u7".into()), ..Default::default() };
        assert_eq!(id.name_or(&UserId::from("u7")), "u7");
    }

    #[test]
    fn test_new_match_seats_host_as_white() {
        let host = Player::new(UserId::from("u1"), &identity("u1", "Ann"), Color::Black, 3);
        let m = Match::new(MatchId::from("abc"), host, Utc::now(), None);

        assert_eq!(m.status, MatchStatus::Pending);
        assert_eq!(m.players.len(), 1);
        assert_eq!(m.players[0].color, Color::White);
        assert_eq!(m.position, INITIAL_POSITION);
        assert_eq!(m.color_of_connection(3), Some(Color::White));
        assert_eq!(m.opponent_connection(Color::White), None);
    }

    #[test]
    fn test_expiry_only_applies_while_pending() {
        let host = Player::new(UserId::from("u1"), &identity("u1", "Ann"), Color::White, 1);
        let now = Utc::now();
        let mut m = Match::new(MatchId::from("abc"), host, now, Some(now));

        assert!(m.is_expired(now));
        m.status = MatchStatus::Ready;
        assert!(!m.is_expired(now));
    }

    #[test]
    fn test_color_serialization() {
        assert_eq!(serde_json::to_string(&Color::White).unwrap(), "\"white\"");
        assert_eq!(serde_json::to_string(&MatchStatus::Started).unwrap(), "\"started\"");
        assert_eq!(Color::Black.opposite(), Color::White);
    }
}
