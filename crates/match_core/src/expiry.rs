//! Per-match timers.
//!
//! The [`ExpiryScheduler`] owns at most one timer per match id. Arming a timer
//! for an id that already has one aborts the old timer first, so timers never
//! stack. A timer that elapses does not touch any match itself: it sends a
//! [`TimerFired`] notice carrying only the match id, the timer kind and a
//! generation number. The consumer re-reads the match, confirms the notice is
//! still current with [`ExpiryScheduler::complete`], and then decides what to do.
//!
//! Callers arm, cancel and complete timers while holding the match lock, which
//! makes the generation check exact.

use crate::model::MatchId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Purpose of an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// A newly created match was never joined.
    PendingExpiry,
    /// The joiner left a ready match and nobody took the seat.
    DisconnectGrace,
    /// A finished match has been kept around long enough.
    FinishedRetention,
    /// Both players of a started match dropped and neither came back.
    Abandoned,
}

/// Notice sent when a timer elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub match_id: MatchId,
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
struct TimerSlot {
    kind: TimerKind,
    generation: u64,
    handle: JoinHandle<()>,
}

/// One-timer-per-match scheduler.
#[derive(Debug)]
pub struct ExpiryScheduler {
    slots: DashMap<MatchId, TimerSlot>,
    next_generation: AtomicU64,
    fired_sender: mpsc::UnboundedSender<TimerFired>,
}

impl ExpiryScheduler {
    /// Creates a scheduler and the receiver its timers report to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_sender, fired_receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            slots: DashMap::new(),
            next_generation: AtomicU64::new(1),
            fired_sender,
        };
        (scheduler, fired_receiver)
    }

    /// Arms a timer for `match_id`, replacing any timer already armed for it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `match_id` - The match the timer belongs to
    /// * `kind` - What the timer is for
    /// * `after` - Delay before the timer fires
    ///
    /// # Returns
    ///
    /// The generation number identifying this arming.
    pub fn arm(&self, match_id: &MatchId, kind: TimerKind, after: Duration) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let sender = self.fired_sender.clone();
        let fired = TimerFired {
            match_id: match_id.clone(),
            kind,
            generation,
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The receiver is gone only after shutdown.
            let _ = sender.send(fired);
        });

        let slot = TimerSlot { kind, generation, handle };
        if let Some(previous) = self.slots.insert(match_id.clone(), slot) {
            previous.handle.abort();
            trace!("⏱️ Replaced {:?} timer for match {}", previous.kind, match_id);
        }
        trace!("⏱️ Armed {:?} timer for match {} ({:?})", kind, match_id, after);
        generation
    }

    /// Disarms the timer for `match_id`.
    ///
    /// # Returns
    ///
    /// `true` if a timer was armed.
    pub fn cancel(&self, match_id: &MatchId) -> bool {
        match self.slots.remove(match_id) {
            Some((_, slot)) => {
                slot.handle.abort();
                trace!("⏱️ Cancelled {:?} timer for match {}", slot.kind, match_id);
                true
            }
            None => false,
        }
    }

    /// Consumes a fired notice.
    ///
    /// # Returns
    ///
    /// `true` if the notice belongs to the timer currently armed for its
    /// match, in which case the slot is cleared. `false` means the timer was
    /// cancelled or replaced after it elapsed and the notice must be ignored.
    pub fn complete(&self, fired: &TimerFired) -> bool {
        self.slots
            .remove_if(&fired.match_id, |_, slot| slot.generation == fired.generation)
            .is_some()
    }

    /// Kind of the timer armed for `match_id`, if any.
    pub fn armed(&self, match_id: &MatchId) -> Option<TimerKind> {
        self.slots.get(match_id).map(|slot| slot.kind)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Aborts every armed timer.
    pub fn shutdown(&self) {
        for slot in self.slots.iter() {
            slot.handle.abort();
        }
        self.slots.clear();
    }
}
