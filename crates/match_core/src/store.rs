//! In-memory match storage.
//!
//! The [`MatchStore`] maps match ids to individually locked matches. There is
//! no store-wide lock: the `DashMap` shards only guard insertion, lookup and
//! removal, while each match carries its own `tokio::sync::Mutex` that
//! serializes lifecycle operations addressed to it.

use crate::model::{Match, MatchId, MatchStatus};
use dashmap::{mapref::entry::Entry, DashMap};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared handle to a single match.
pub type MatchHandle = Arc<Mutex<Match>>;

/// Counts of live matches by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub started: usize,
    pub finished: usize,
}

/// Keyed collection of live matches.
#[derive(Debug)]
pub struct MatchStore {
    matches: DashMap<MatchId, MatchHandle>,
    id_length: usize,
}

impl MatchStore {
    /// Creates an empty store that generates ids of `id_length` characters.
    pub fn new(id_length: usize) -> Self {
        Self {
            matches: DashMap::new(),
            id_length,
        }
    }

    /// Allocates a fresh id and stores the match produced by `build`.
    ///
    /// Ids are drawn from `[A-Za-z0-9]` with the thread-local CSPRNG and
    /// retried on collision with a live match.
    ///
    /// # Arguments
    ///
    /// * `build` - Constructs the match for the allocated id
    ///
    /// # Returns
    ///
    /// The allocated id together with the stored handle.
    pub fn allocate<F>(&self, build: F) -> (MatchId, MatchHandle)
    where
        F: FnOnce(MatchId) -> Match,
    {
        loop {
            let id = self.generate_id();
            if let Entry::Vacant(slot) = self.matches.entry(id.clone()) {
                let handle = Arc::new(Mutex::new(build(id.clone())));
                slot.insert(handle.clone());
                return (id, handle);
            }
            debug!("🎲 Match id collision on {}, retrying", id);
        }
    }

    fn generate_id(&self) -> MatchId {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.id_length)
            .map(char::from)
            .collect();
        MatchId(id)
    }

    /// Looks up a match handle without locking it.
    pub fn get(&self, id: &MatchId) -> Option<MatchHandle> {
        self.matches.get(id).map(|entry| entry.value().clone())
    }

    /// Removes a match. The caller is expected to hold the match lock and to
    /// set [`Match::removed`] on it.
    pub fn remove(&self, id: &MatchId) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Drops every match, flagging each one as removed.
    pub async fn clear(&self) {
        for handle in self.handles() {
            handle.lock().await.removed = true;
        }
        self.matches.clear();
    }

    /// Snapshot of per-status counts.
    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for handle in self.handles() {
            let m = handle.lock().await;
            if m.removed {
                continue;
            }
            stats.total += 1;
            match m.status {
                MatchStatus::Pending => stats.pending += 1,
                MatchStatus::Ready => stats.ready += 1,
                MatchStatus::Started => stats.started += 1,
                MatchStatus::Finished => stats.finished += 1,
                MatchStatus::Cancelled => {}
            }
        }
        stats
    }

    // Handles are cloned out first so no shard guard is held across an await.
    fn handles(&self) -> Vec<MatchHandle> {
        self.matches.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, Identity, Player, UserId};
    use chrono::Utc;
    use std::collections::HashSet;

    fn build(id: MatchId) -> Match {
        let identity = Identity { user_id: Some("host".into()), ..Default::default() };
        let host = Player::new(UserId::from("host"), &identity, Color::White, 1);
        Match::new(id, host, Utc::now(), None)
    }

    #[tokio::test]
    async fn test_allocate_generates_url_safe_ids() {
        let store = MatchStore::new(12);
        let mut seen = HashSet::new();

        for _ in 0..200 {
            let (id, handle) = store.allocate(build);
            assert_eq!(id.as_str().len(), 12);
            assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            assert_eq!(handle.lock().await.id, id);
            assert!(seen.insert(id));
        }
        assert_eq!(store.len(), 200);
    }

    #[tokio::test]
    async fn test_get_and_remove() {
        let store = MatchStore::new(8);
        let (id, _) = store.allocate(build);

        assert!(store.get(&id).is_some());
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
        assert!(store.remove(&id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let store = MatchStore::new(8);
        let (_, first) = store.allocate(build);
        let (_, second) = store.allocate(build);
        second.lock().await.status = MatchStatus::Started;

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.started, 1);

        store.clear().await;
        assert!(store.is_empty());
        assert!(first.lock().await.removed);
    }
}
