//! Identity to connection bookkeeping.
//!
//! The [`ConnectionRegistry`] answers two questions for the lifecycle
//! controller: which connection currently speaks for a given user, and which
//! matches a given connection has created, joined or rejoined. Both maps are
//! `DashMap`s, so every update is atomic per key without a registry-wide lock.

use crate::model::{ConnectionId, MatchId, UserId};
use dashmap::DashMap;
use std::collections::BTreeSet;
use tracing::debug;

/// What the registry knows about one live connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub user: Option<UserId>,
    /// Every live match this connection has taken a seat in
    pub match_ids: BTreeSet<MatchId>,
}

/// Maps stable identities to their active transport connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<UserId, ConnectionId>,
    by_connection: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user` to `connection`, replacing any earlier binding.
    ///
    /// # Returns
    ///
    /// The connection the user was previously bound to, if it differs.
    pub fn bind(&self, user: &UserId, connection: ConnectionId) -> Option<ConnectionId> {
        self.by_connection.entry(connection).or_default().user = Some(user.clone());
        let previous = self.by_user.insert(user.clone(), connection);
        match previous {
            Some(old) if old != connection => {
                debug!("🔁 User {} moved from connection {} to {}", user, old, connection);
                Some(old)
            }
            _ => None,
        }
    }

    /// Currently active connection for `user`.
    pub fn connection_for(&self, user: &UserId) -> Option<ConnectionId> {
        self.by_user.get(user).map(|c| *c)
    }

    /// User bound to `connection`.
    pub fn user_for(&self, connection: ConnectionId) -> Option<UserId> {
        self.by_connection.get(&connection).and_then(|e| e.user.clone())
    }

    /// Records that `connection` is taking part in `match_id`, alongside any
    /// matches it already holds a seat in.
    pub fn add_match(&self, connection: ConnectionId, match_id: &MatchId) {
        self.by_connection
            .entry(connection)
            .or_default()
            .match_ids
            .insert(match_id.clone());
    }

    /// Matches `connection` has taken part in, in id order.
    pub fn matches_for(&self, connection: ConnectionId) -> Vec<MatchId> {
        self.by_connection
            .get(&connection)
            .map(|e| e.match_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops `match_id` from the index of each of `connections`, leaving
    /// their other matches in place.
    pub fn forget_match(&self, match_id: &MatchId, connections: &[ConnectionId]) {
        for connection in connections {
            if let Some(mut entry) = self.by_connection.get_mut(connection) {
                entry.match_ids.remove(match_id);
            }
        }
    }

    /// Removes a connection.
    ///
    /// The user's identity binding is only dropped when it still points at
    /// this connection, so a stale disconnect after a reconnect leaves the new
    /// binding intact.
    ///
    /// # Returns
    ///
    /// The removed entry, or `None` if the connection was already gone. A
    /// `None` result makes repeated disconnect notifications harmless.
    pub fn unbind(&self, connection: ConnectionId) -> Option<ConnectionEntry> {
        let (_, entry) = self.by_connection.remove(&connection)?;
        if let Some(user) = entry.user.as_ref() {
            self.by_user.remove_if(user, |_, bound| *bound == connection);
        }
        Some(entry)
    }

    /// Number of connections with a known identity.
    pub fn bound_users(&self) -> usize {
        self.by_user.len()
    }

    pub fn clear(&self) {
        self.by_user.clear();
        self.by_connection.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");

        assert_eq!(registry.bind(&user, 7), None);
        assert_eq!(registry.connection_for(&user), Some(7));
        assert_eq!(registry.user_for(7), Some(user.clone()));
        assert_eq!(registry.bind(&user, 7), None);
    }

    #[test]
    fn test_reconnect_replaces_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");
        registry.bind(&user, 1);

        assert_eq!(registry.bind(&user, 2), Some(1));
        assert_eq!(registry.connection_for(&user), Some(2));

        // The old socket closing must not unbind the new one.
        assert!(registry.unbind(1).is_some());
        assert_eq!(registry.connection_for(&user), Some(2));
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");
        let match_id = MatchId::from("m1");
        registry.bind(&user, 4);
        registry.add_match(4, &match_id);

        let entry = registry.unbind(4).expect("first unbind returns the entry");
        assert_eq!(entry.user, Some(user.clone()));
        assert_eq!(entry.match_ids, BTreeSet::from([match_id]));
        assert!(registry.unbind(4).is_none());
        assert_eq!(registry.connection_for(&user), None);
    }

    #[test]
    fn test_forget_match_only_clears_matching_entries() {
        let registry = ConnectionRegistry::new();
        let m1 = MatchId::from("m1");
        let m2 = MatchId::from("m2");
        registry.add_match(1, &m1);
        registry.add_match(2, &m2);

        registry.forget_match(&m1, &[1, 2]);
        assert!(registry.matches_for(1).is_empty());
        assert_eq!(registry.matches_for(2), vec![m2]);
    }

    #[test]
    fn test_connection_keeps_every_match() {
        let registry = ConnectionRegistry::new();
        let first = MatchId::from("m1");
        let second = MatchId::from("m2");
        registry.add_match(3, &second);
        registry.add_match(3, &first);
        registry.add_match(3, &first);

        assert_eq!(registry.matches_for(3), vec![first.clone(), second.clone()]);

        registry.forget_match(&first, &[3]);
        assert_eq!(registry.matches_for(3), vec![second]);
    }
}
