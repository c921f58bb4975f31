//! Lifecycle operations of the [`MatchCoordinator`].
//!
//! Each operation follows the same shape: lock the addressed match, check
//! preconditions, mutate, queue notifications, unlock by returning. A
//! returned [`MatchError`] is reported to the requester by `dispatch`.

use super::MatchCoordinator;
use crate::engine::DrawReason;
use crate::error::MatchError;
use crate::expiry::TimerKind;
use crate::model::{Color, ConnectionId, Finished, Identity, Match, MatchId, MatchStatus, Player, UserId};
use crate::protocol::{CancelRequest, DrawOfferNotice, MoveRequest, PlayerRef, RejoinRequest, ServerMessage};
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use std::time::Duration;
use tracing::{debug, info, warn};

fn deadline(now: DateTime<Utc>, after: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

fn not_a_participant() -> MatchError {
    MatchError::Unauthorized("not a participant in this match".to_string())
}

fn missing_identity() -> MatchError {
    MatchError::Unauthorized("missing identity".to_string())
}

impl MatchCoordinator {
    /// Creates a pending match hosted by the requester, seated as white.
    ///
    /// # Arguments
    ///
    /// * `connection` - The host's connection
    /// * `identity` - Identity claims of the host; a user id is required
    ///
    /// # Returns
    ///
    /// The id of the new match. `match-created` has already been queued to
    /// the host when this returns.
    pub async fn create_match(
        &self,
        connection: ConnectionId,
        identity: Identity,
    ) -> Result<MatchId, MatchError> {
        let user = identity.user().ok_or_else(missing_identity)?;
        self.registry.bind(&user, connection);

        let now = Utc::now();
        let expires_at = deadline(now, self.settings.pending_expiry());
        let host = Player::new(user.clone(), &identity, Color::White, connection);
        let (match_id, handle) = self.store.allocate(|id| Match::new(id, host, now, expires_at));

        let m = handle.lock().await;
        self.scheduler
            .arm(&match_id, TimerKind::PendingExpiry, self.settings.pending_expiry());
        self.registry.add_match(connection, &match_id);
        self.send(connection, &ServerMessage::MatchCreated(m.view()));

        info!("🆕 Match {} created by {} (connection {})", match_id, user, connection);
        Ok(match_id)
    }

    /// Looks up a match. Open to anyone.
    pub async fn get_match(&self, connection: ConnectionId, match_id: &MatchId) -> Result<(), MatchError> {
        let m = self.lock_live(match_id).await?;
        self.send(connection, &ServerMessage::MatchFound(m.view()));
        Ok(())
    }

    /// Seats the requester as black, or reattaches the existing black player
    /// to a new connection.
    pub async fn join_match(
        &self,
        connection: ConnectionId,
        match_id: &MatchId,
        identity: Identity,
    ) -> Result<(), MatchError> {
        let user = identity.user().ok_or_else(missing_identity)?;
        let mut m = self.lock_live(match_id).await?;

        if m.status == MatchStatus::Cancelled || m.is_expired(Utc::now()) {
            self.expire(&mut m, Some(connection));
            return Err(MatchError::Expired(match_id.clone()));
        }
        if matches!(m.status, MatchStatus::Started | MatchStatus::Finished) {
            return Err(MatchError::AlreadyStarted(match_id.clone()));
        }
        if m.host().is_some_and(|host| host.id == user) {
            return Err(MatchError::SelfJoin(match_id.clone()));
        }

        if let Some(joiner) = m.joiner() {
            if joiner.id != user {
                return Err(MatchError::Full(match_id.clone()));
            }
            let previous = joiner.connection;
            m.players[Color::Black.seat()].connection = connection;
            self.registry.bind(&user, connection);
            self.registry.add_match(connection, match_id);
            self.send_all(&m, &ServerMessage::MatchJoined(m.view()));
            info!(
                "🔁 {} reattached to match {} (connection {} -> {})",
                user, match_id, previous, connection
            );
            return Ok(());
        }

        m.players.push(Player::new(user.clone(), &identity, Color::Black, connection));
        m.status = MatchStatus::Ready;
        m.expires_at = None;
        self.scheduler.cancel(match_id);
        self.registry.bind(&user, connection);
        self.registry.add_match(connection, match_id);
        self.send_all(&m, &ServerMessage::MatchJoined(m.view()));

        info!("🤝 {} joined match {} as black", user, match_id);
        Ok(())
    }

    /// Reattaches a seated participant to a new connection and replays the
    /// current state to it.
    pub async fn rejoin_match(&self, connection: ConnectionId, request: RejoinRequest) -> Result<(), MatchError> {
        let user = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(UserId::from)
            .ok_or_else(missing_identity)?;
        let match_id = request.match_id;
        let mut m = self.lock_live(&match_id).await?;

        let seat = m
            .players
            .iter()
            .position(|p| p.id == user)
            .ok_or_else(not_a_participant)?;
        let previous = m.players[seat].connection;
        let color = m.players[seat].color;
        m.players[seat].connection = connection;
        self.registry.bind(&user, connection);
        self.registry.add_match(connection, &match_id);
        if m.status == MatchStatus::Started && self.scheduler.armed(&match_id) == Some(TimerKind::Abandoned) {
            self.scheduler.cancel(&match_id);
        }

        self.send(connection, &ServerMessage::MatchFound(m.view()));
        if matches!(m.status, MatchStatus::Started | MatchStatus::Finished) {
            self.send(connection, &ServerMessage::MatchState(m.state_view()));
        }
        if previous != connection {
            let notice = ServerMessage::PlayerReconnected(PlayerRef {
                match_id: match_id.clone(),
                player_id: user.clone(),
            });
            self.send_opponent(&m, color, &notice);
        }

        info!("🔌 {} rejoined match {} as {} (connection {})", user, match_id, color, connection);
        Ok(())
    }

    /// Starts a ready match with a fresh rules engine.
    ///
    /// Repeated start requests on a running or finished match re-send
    /// `match-started` to the requester only.
    pub async fn start_match(&self, connection: ConnectionId, match_id: &MatchId) -> Result<(), MatchError> {
        let mut m = self.lock_live(match_id).await?;
        if self.resolve_color(&m, connection).is_none() {
            return Err(not_a_participant());
        }

        match m.status {
            MatchStatus::Started | MatchStatus::Finished => {
                debug!("♻️ Match {} already started, replaying to connection {}", match_id, connection);
                self.send(connection, &ServerMessage::MatchStarted(m.view()));
                return Ok(());
            }
            MatchStatus::Ready if m.players.len() == 2 => {}
            _ => return Err(MatchError::NotReady(match_id.clone())),
        }

        m.engine = Some(self.engines.new_game());
        m.status = MatchStatus::Started;
        m.history.clear();
        m.last_move = None;
        m.draw_offer = None;
        m.finished = None;
        m.refresh_from_engine();
        self.send_all(&m, &ServerMessage::MatchStarted(m.view()));

        info!("▶️ Match {} started", match_id);
        Ok(())
    }

    /// Validates and applies a move for the side to move.
    ///
    /// Moves for unknown or not-started matches are ignored.
    pub async fn apply_move(&self, connection: ConnectionId, request: MoveRequest) -> Result<(), MatchError> {
        let Ok(mut m) = self.lock_live(&request.match_id).await else {
            debug!("Move for unknown match {} ignored", request.match_id);
            return Ok(());
        };
        if m.status != MatchStatus::Started {
            debug!("Move for match {} ignored in status {:?}", m.id, m.status);
            return Ok(());
        }
        let color = self.resolve_color(&m, connection).ok_or_else(not_a_participant)?;
        let match_id = m.id.clone();

        let Some(engine) = m.engine.as_mut() else {
            warn!("⚠️ Started match {} has no rules engine", match_id);
            return Ok(());
        };
        let to_move = engine.side_to_move();
        if to_move != color {
            return Err(MatchError::not_your_turn(&match_id, to_move));
        }
        let applied = engine
            .apply_move(&request.from, &request.to, request.promotion_letter())
            .map_err(|e| MatchError::illegal_move(&match_id, e.to_string()))?;
        let outcome = if engine.is_checkmate() {
            Some(Finished::checkmate(color))
        } else {
            engine.draw_reason().map(Finished::draw)
        };

        debug!("♟️ {} played {} in match {}", color, applied.notation, match_id);
        m.last_move = Some(applied);
        m.draw_offer = None;
        m.refresh_from_engine();
        if let Some(finished) = outcome {
            self.finish(&mut m, finished);
        }
        self.send_all(&m, &ServerMessage::MatchState(m.state_view()));
        Ok(())
    }

    /// Records a draw offer and forwards it to the opponent.
    pub async fn offer_draw(&self, connection: ConnectionId, match_id: &MatchId) -> Result<(), MatchError> {
        let Ok(mut m) = self.lock_live(match_id).await else {
            return Ok(());
        };
        if m.status != MatchStatus::Started {
            debug!("Draw offer for match {} ignored in status {:?}", match_id, m.status);
            return Ok(());
        }
        let color = self.resolve_color(&m, connection).ok_or_else(not_a_participant)?;
        let from_name = m.player(color).map(|p| p.name.clone()).unwrap_or_default();

        m.draw_offer = Some(color);
        let notice = ServerMessage::DrawOffer(DrawOfferNotice {
            match_id: match_id.clone(),
            from: color,
            from_name,
        });
        self.send_opponent(&m, color, &notice);

        info!("🤝 {} offered a draw in match {}", color, match_id);
        Ok(())
    }

    /// Accepts or declines the opponent's outstanding draw offer.
    pub async fn respond_draw(
        &self,
        connection: ConnectionId,
        match_id: &MatchId,
        accept: bool,
    ) -> Result<(), MatchError> {
        let Ok(mut m) = self.lock_live(match_id).await else {
            return Ok(());
        };
        if m.status != MatchStatus::Started {
            debug!("Draw response for match {} ignored in status {:?}", match_id, m.status);
            return Ok(());
        }
        let color = self.resolve_color(&m, connection).ok_or_else(not_a_participant)?;

        if m.draw_offer != Some(color.opposite()) {
            warn!("⚠️ {} answered a draw offer that is not pending in match {}", color, match_id);
            return Ok(());
        }
        m.draw_offer = None;

        if accept {
            self.finish(&mut m, Finished::draw(DrawReason::Agreed));
            self.send_all(&m, &ServerMessage::MatchState(m.state_view()));
        } else {
            self.send_opponent(&m, color, &ServerMessage::DrawDeclined(ServerMessage::match_ref(match_id)));
            info!("🙅 {} declined the draw in match {}", color, match_id);
        }
        Ok(())
    }

    /// Ends the match in favour of the requester's opponent.
    pub async fn resign(&self, connection: ConnectionId, match_id: &MatchId) -> Result<(), MatchError> {
        let Ok(mut m) = self.lock_live(match_id).await else {
            return Ok(());
        };
        if m.status != MatchStatus::Started {
            debug!("Resignation for match {} ignored in status {:?}", match_id, m.status);
            return Ok(());
        }
        let color = self.resolve_color(&m, connection).ok_or_else(not_a_participant)?;

        self.finish(&mut m, Finished::resignation(color.opposite()));
        self.send_all(&m, &ServerMessage::MatchState(m.state_view()));
        Ok(())
    }

    /// Lets the host withdraw a match that has not started.
    ///
    /// Without an explicit match id, the first pending or ready match this
    /// connection hosts is cancelled.
    pub async fn cancel_match(&self, connection: ConnectionId, request: CancelRequest) -> Result<(), MatchError> {
        let mut m = match request.match_id {
            Some(match_id) => self.lock_live(&match_id).await?,
            None => self.hosted_open_match(connection).await.ok_or_else(|| {
                MatchError::Unauthorized("no cancellable match for this connection".to_string())
            })?,
        };
        let match_id = m.id.clone();

        if self.resolve_color(&m, connection) != Some(Color::White) {
            return Err(MatchError::Unauthorized("only the host can cancel this match".to_string()));
        }
        if matches!(m.status, MatchStatus::Started | MatchStatus::Finished) {
            return Err(MatchError::AlreadyStarted(match_id));
        }

        m.status = MatchStatus::Cancelled;
        let notice = ServerMessage::MatchCancelled(ServerMessage::match_ref(&match_id));
        if let Some(joiner) = m.joiner() {
            self.send(joiner.connection, &notice);
        }
        self.send(connection, &notice);
        self.retire(&mut m);

        info!("❌ Match {} cancelled by its host", match_id);
        Ok(())
    }

    /// Handles a transport disconnect.
    ///
    /// Every match the connection holds a seat in is visited in turn, one
    /// lock at a time. Safe to call more than once for the same connection;
    /// only the first call has any effect.
    pub async fn on_disconnect(&self, connection: ConnectionId) {
        let Some(entry) = self.registry.unbind(connection) else {
            return;
        };
        if entry.match_ids.is_empty() {
            debug!("Connection {} left without a match", connection);
            return;
        }
        for match_id in &entry.match_ids {
            self.leave_match(connection, match_id).await;
        }
    }

    async fn leave_match(&self, connection: ConnectionId, match_id: &MatchId) {
        let Ok(mut m) = self.lock_live(match_id).await else {
            return;
        };
        let Some(seat) = m.players.iter().position(|p| p.connection == connection) else {
            debug!("Connection {} no longer seated in match {}", connection, match_id);
            return;
        };
        let player = m.players[seat].clone();
        let notice = PlayerRef {
            match_id: match_id.clone(),
            player_id: player.id.clone(),
        };

        // Any disconnect lapses an outstanding draw offer.
        m.draw_offer = None;

        match m.status {
            MatchStatus::Started => {
                self.send_opponent(&m, player.color, &ServerMessage::PlayerDisconnected(notice));
                info!("📴 {} disconnected from running match {}", player.id, match_id);
                if !self.any_seat_connected(&m) {
                    self.scheduler
                        .arm(match_id, TimerKind::Abandoned, self.settings.abandoned_match());
                    info!("🕸️ Both players left match {}", match_id);
                }
            }
            MatchStatus::Ready if player.color == Color::Black => {
                m.players.truncate(1);
                m.status = MatchStatus::Pending;
                let grace = self.settings.disconnect_grace();
                m.expires_at = deadline(Utc::now(), grace);
                self.scheduler.arm(match_id, TimerKind::DisconnectGrace, grace);
                self.send_opponent(&m, player.color, &ServerMessage::OpponentLeft(notice));
                info!("🚪 Joiner {} left match {}, seat reopened", player.id, match_id);
            }
            MatchStatus::Ready => {
                self.send_opponent(&m, player.color, &ServerMessage::PlayerDisconnected(notice));
                info!("📴 Host {} disconnected from ready match {}", player.id, match_id);
            }
            MatchStatus::Pending | MatchStatus::Finished | MatchStatus::Cancelled => {
                debug!("{} disconnected from {:?} match {}", player.id, m.status, match_id);
            }
        }
    }

    /// First match hosted on `connection` that can still be cancelled,
    /// returned locked.
    async fn hosted_open_match(&self, connection: ConnectionId) -> Option<OwnedMutexGuard<Match>> {
        for match_id in self.registry.matches_for(connection) {
            let Ok(m) = self.lock_live(&match_id).await else {
                continue;
            };
            if self.resolve_color(&m, connection) == Some(Color::White)
                && matches!(m.status, MatchStatus::Pending | MatchStatus::Ready)
            {
                return Some(m);
            }
        }
        None
    }
}
