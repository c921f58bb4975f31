//! Concurrent requests against the same and against different matches.

use match_core::protocol::MoveRequest;
use match_core::testing::{recording_coordinator, RecordingOutbox, ScriptedFactory};
use match_core::{ConnectionId, Identity, MatchCoordinator, MatchError, MatchSettings, MatchStatus};
use std::sync::Arc;

fn identity(user: &str) -> Identity {
    Identity {
        user_id: Some(user.to_string()),
        ..Default::default()
    }
}

fn setup() -> (Arc<MatchCoordinator>, Arc<RecordingOutbox>) {
    recording_coordinator(MatchSettings::default(), Arc::new(ScriptedFactory::default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_joins_seat_exactly_one_player() {
    let (c, outbox) = setup();
    let id = c.create_match(1, identity("host")).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..16usize {
        let c = c.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let connection: ConnectionId = 100 + n;
            c.join_match(connection, &id, identity(&format!("guest-{n}"))).await
        }));
    }

    let mut seated = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => seated += 1,
            Err(MatchError::Full(_)) => full += 1,
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }
    assert_eq!(seated, 1);
    assert_eq!(full, 15);

    let handle = c.store().get(&id).unwrap();
    let m = handle.lock().await;
    assert_eq!(m.status, MatchStatus::Ready);
    assert_eq!(m.players.len(), 2);
    // The host heard about exactly one join.
    assert_eq!(outbox.events_for(1), vec!["match-created", "match-joined"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_moves_from_both_sides_keep_turn_order() {
    let (c, _outbox) = setup();
    let id = c.create_match(1, identity("white")).await.unwrap();
    c.join_match(2, &id, identity("black")).await.unwrap();
    c.start_match(1, &id).await.unwrap();

    // Both players hammer the match; only moves on their own turn land.
    let mut tasks = Vec::new();
    for (connection, from, to) in [(1usize, "a2", "a3"), (2, "a7", "a6")] {
        for _ in 0..50 {
            let c = c.clone();
            let request = MoveRequest {
                match_id: id.clone(),
                from: from.into(),
                to: to.into(),
                promotion: None,
            };
            tasks.push(tokio::spawn(async move { c.apply_move(connection, request).await }));
        }
    }
    for task in tasks {
        let _ = task.await.unwrap();
    }

    let handle = c.store().get(&id).unwrap();
    let m = handle.lock().await;
    for (ply, notation) in m.history.iter().enumerate() {
        let expected = if ply % 2 == 0 { "a2-a3" } else { "a7-a6" };
        assert_eq!(notation, expected, "ply {ply} out of order");
    }
    assert!(!m.history.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_matches_progress_in_parallel() {
    let (c, _outbox) = setup();

    let mut tasks = Vec::new();
    for n in 0..32usize {
        let c = c.clone();
        tasks.push(tokio::spawn(async move {
            let host = n * 2 + 1000;
            let guest = host + 1;
            let id = c.create_match(host, identity(&format!("h{n}"))).await.unwrap();
            c.join_match(guest, &id, identity(&format!("g{n}"))).await.unwrap();
            c.start_match(host, &id).await.unwrap();
            c.resign(guest, &id).await.unwrap();
            id
        }));
    }

    for task in tasks {
        let id = task.await.unwrap();
        let handle = c.store().get(&id).unwrap();
        assert_eq!(handle.lock().await.status, MatchStatus::Finished);
    }
    assert_eq!(c.stats().await.matches.finished, 32);
}
