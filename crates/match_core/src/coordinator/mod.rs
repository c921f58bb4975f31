//! The match lifecycle controller.
//!
//! [`MatchCoordinator`] is the single entry point for everything that mutates
//! a match: client requests arriving through [`MatchCoordinator::dispatch`],
//! transport disconnects through [`MatchCoordinator::on_disconnect`], and
//! elapsed timers delivered by the expiry loop started in
//! [`MatchCoordinator::init`].
//!
//! ## Atomicity
//!
//! Every operation locks the addressed match, validates, commits and queues
//! its outbound messages before releasing the lock. Nothing inside that
//! critical section awaits, so for a given match the observable effect of
//! concurrent requests is always that of some serial order. Different matches
//! never contend with each other.
//!
//! ## Delivery
//!
//! Messages are handed to an [`Outbox`] while the lock is held, which keeps
//! the per-connection delivery order identical to the commit order.

use crate::config::MatchSettings;
use crate::engine::RulesEngineFactory;
use crate::error::MatchError;
use crate::expiry::{ExpiryScheduler, TimerFired, TimerKind};
use crate::model::{Color, ConnectionId, Finished, Match, MatchId, MatchStatus};
use crate::outbox::Outbox;
use crate::protocol::{InboundEvent, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::store::{MatchStore, StoreStats};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

mod lifecycle;


/// Point-in-time counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub matches: StoreStats,
    pub armed_timers: usize,
    pub bound_users: usize,
}

/// Authoritative coordinator for all live matches.
///
/// Construct one per process, wrap it in an `Arc`, call
/// [`init`](Self::init) once inside the Tokio runtime and
/// [`shutdown`](Self::shutdown) when the process stops.
pub struct MatchCoordinator {
    settings: MatchSettings,
    store: MatchStore,
    registry: ConnectionRegistry,
    scheduler: ExpiryScheduler,
    engines: Arc<dyn RulesEngineFactory>,
    outbox: Arc<dyn Outbox>,
    fired_receiver: Mutex<Option<mpsc::UnboundedReceiver<TimerFired>>>,
    expiry_task: Mutex<Option<JoinHandle<()>>>,
}

impl MatchCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `settings` - Timer durations and id length
    /// * `engines` - Factory producing a rules engine for each started match
    /// * `outbox` - Where outbound messages are queued
    pub fn new(
        settings: MatchSettings,
        engines: Arc<dyn RulesEngineFactory>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        let (scheduler, fired_receiver) = ExpiryScheduler::new();
        Self {
            store: MatchStore::new(settings.match_id_length),
            settings,
            registry: ConnectionRegistry::new(),
            scheduler,
            engines,
            outbox,
            fired_receiver: Mutex::new(Some(fired_receiver)),
            expiry_task: Mutex::new(None),
        }
    }

    /// Starts the expiry loop. Calling it again is a no-op.
    ///
    /// The loop holds only a weak reference to the coordinator, so dropping
    /// the last `Arc` also ends it.
    pub fn init(self: &Arc<Self>) {
        let receiver = self
            .fired_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            debug!("Match coordinator already initialized");
            return;
        };

        let coordinator = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(fired) = receiver.recv().await {
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                coordinator.on_timer(fired).await;
            }
            debug!("⏱️ Expiry loop stopped");
        });

        *self.expiry_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!(
            "♟️ Match coordinator initialized (pending expiry {}s, grace {}s, retention {}s)",
            self.settings.pending_expiry_secs,
            self.settings.disconnect_grace_secs,
            self.settings.finished_retention_secs
        );
    }

    /// Disarms every timer, stops the expiry loop and drops all matches.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        if let Some(task) = self.expiry_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        let remaining = self.store.len();
        self.store.clear().await;
        self.registry.clear();
        info!("🛑 Match coordinator shut down ({} live matches dropped)", remaining);
    }

    /// Routes one decoded client request to its lifecycle operation.
    ///
    /// Rejections are reported to `connection` only; nothing here is fatal.
    pub async fn dispatch(&self, connection: ConnectionId, event: InboundEvent) {
        let name = event.name();
        debug!(connection_id = connection, "📨 Dispatching '{}'", name);

        let result = match event {
            InboundEvent::CreateMatch(payload) => {
                self.create_match(connection, payload.into()).await.map(|_| ())
            }
            InboundEvent::GetMatch(request) => self.get_match(connection, &request.match_id).await,
            InboundEvent::JoinMatch(request) => {
                self.join_match(connection, &request.match_id, request.identity.into()).await
            }
            InboundEvent::RejoinMatch(request) => self.rejoin_match(connection, request).await,
            InboundEvent::StartMatch(request) => self.start_match(connection, &request.match_id).await,
            InboundEvent::ChessMove(request) => self.apply_move(connection, request).await,
            InboundEvent::OfferDraw(request) => self.offer_draw(connection, &request.match_id).await,
            InboundEvent::RespondDraw(request) => {
                self.respond_draw(connection, &request.match_id, request.accept).await
            }
            InboundEvent::Resign(request) => self.resign(connection, &request.match_id).await,
            InboundEvent::CancelMatch(request) => self.cancel_match(connection, request).await,
        };

        if let Err(error) = result {
            warn!(connection_id = connection, "🚫 '{}' rejected: {}", name, error);
            self.outbox.deliver(connection, &error.to_message());
        }
    }

    /// Handles a fired timer by re-reading the match it names.
    async fn on_timer(&self, fired: TimerFired) {
        let Some(handle) = self.store.get(&fired.match_id) else {
            self.scheduler.complete(&fired);
            trace!("⏱️ Timer for vanished match {} ignored", fired.match_id);
            return;
        };

        let mut m = handle.lock_owned().await;
        if m.removed || !self.scheduler.complete(&fired) {
            trace!("⏱️ Stale {:?} timer for match {} ignored", fired.kind, fired.match_id);
            return;
        }

        match fired.kind {
            TimerKind::PendingExpiry | TimerKind::DisconnectGrace => {
                if m.status == MatchStatus::Pending && m.players.len() < 2 {
                    self.expire(&mut m, None);
                } else {
                    debug!("⏱️ {:?} for match {} superseded by {:?}", fired.kind, m.id, m.status);
                }
            }
            TimerKind::FinishedRetention => {
                if m.status == MatchStatus::Finished {
                    self.retire(&mut m);
                    info!("🧹 Evicted finished match {}", m.id);
                }
            }
            TimerKind::Abandoned => {
                if m.status == MatchStatus::Started && !self.any_seat_connected(&m) {
                    m.status = MatchStatus::Cancelled;
                    self.retire(&mut m);
                    info!("🧹 Evicted abandoned match {}", m.id);
                } else {
                    debug!("⏱️ Abandonment of match {} superseded by {:?}", m.id, m.status);
                }
            }
        }
    }

    /// Current monitoring counters.
    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            matches: self.store.stats().await,
            armed_timers: self.scheduler.len(),
            bound_users: self.registry.bound_users(),
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    // ---- helpers shared by the lifecycle operations ----

    /// Locks a match that is still in the store.
    async fn lock_live(&self, match_id: &MatchId) -> Result<OwnedMutexGuard<Match>, MatchError> {
        let handle = self
            .store
            .get(match_id)
            .ok_or_else(|| MatchError::NotFound(match_id.clone()))?;
        let guard = handle.lock_owned().await;
        if guard.removed {
            return Err(MatchError::NotFound(match_id.clone()));
        }
        Ok(guard)
    }

    /// Color of the participant speaking on `connection`.
    ///
    /// The connection must be the one the registry currently binds to that
    /// participant's identity; superseded sockets are not participants.
    fn resolve_color(&self, m: &Match, connection: ConnectionId) -> Option<Color> {
        let color = m.color_of_connection(connection)?;
        let user = self.registry.user_for(connection)?;
        (m.player(color)?.id == user).then_some(color)
    }

    /// Whether any seated player's identity is still bound to the
    /// connection recorded on their seat.
    fn any_seat_connected(&self, m: &Match) -> bool {
        m.players
            .iter()
            .any(|p| self.registry.connection_for(&p.id) == Some(p.connection))
    }

    fn send(&self, connection: ConnectionId, message: &ServerMessage) {
        self.outbox.deliver(connection, message);
    }

    fn send_all(&self, m: &Match, message: &ServerMessage) {
        for connection in m.connections() {
            self.outbox.deliver(connection, message);
        }
    }

    fn send_opponent(&self, m: &Match, color: Color, message: &ServerMessage) {
        if let Some(connection) = m.opponent_connection(color) {
            self.outbox.deliver(connection, message);
        }
    }

    /// Finishes a started match and arms its retention timer.
    fn finish(&self, m: &mut Match, finished: Finished) {
        info!(
            "🏁 Match {} finished: {:?} (winner: {:?}, reason: {:?})",
            m.id, finished.result, finished.winner, finished.reason
        );
        m.finish(finished);
        self.scheduler
            .arm(&m.id, TimerKind::FinishedRetention, self.settings.finished_retention());
    }

    /// Cancels an unjoined match on expiry and tells every seated player,
    /// resolving each one's current connection at this moment.
    fn expire(&self, m: &mut Match, requester: Option<ConnectionId>) {
        m.status = MatchStatus::Cancelled;
        let notice = ServerMessage::MatchExpired(ServerMessage::match_ref(&m.id));
        for player in &m.players {
            match self.registry.connection_for(&player.id) {
                Some(connection) if Some(connection) != requester => self.send(connection, &notice),
                _ => {}
            }
        }
        self.retire(m);
        info!("⌛ Match {} expired", m.id);
    }

    /// Removes a match from the store and every index pointing at it.
    fn retire(&self, m: &mut Match) {
        self.scheduler.cancel(&m.id);
        self.store.remove(&m.id);
        self.registry.forget_match(&m.id, &m.connections());
        m.removed = true;
    }
}
