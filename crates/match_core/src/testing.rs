//! Test doubles for driving the coordinator without a transport or a real
//! rules engine.
//!
//! [`RecordingOutbox`] captures every delivered message in order.
//! [`ScriptedEngine`] accepts any move whose squares differ, alternates the
//! side to move and ends the game after a configured number of plies.
//!
//! Only built for this crate's own tests or with the `testing` feature.

use crate::config::MatchSettings;
use crate::coordinator::MatchCoordinator;
use crate::engine::{AppliedMove, DrawReason, EngineError, RulesEngine, RulesEngineFactory};
use crate::model::{Color, ConnectionId};
use crate::outbox::Outbox;
use crate::protocol::ServerMessage;
use std::sync::{Arc, Mutex, PoisonError};

/// Outbox that records deliveries for later inspection.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    sent: Mutex<Vec<(ConnectionId, ServerMessage)>>,
}

impl RecordingOutbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything delivered so far, in delivery order.
    pub fn messages(&self) -> Vec<(ConnectionId, ServerMessage)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drains the recorded deliveries.
    pub fn take(&self) -> Vec<(ConnectionId, ServerMessage)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Messages delivered to one connection, in order.
    pub fn for_connection(&self, connection: ConnectionId) -> Vec<ServerMessage> {
        self.messages()
            .into_iter()
            .filter(|(to, _)| *to == connection)
            .map(|(_, message)| message)
            .collect()
    }

    /// Event names delivered to one connection, in order.
    pub fn events_for(&self, connection: ConnectionId) -> Vec<&'static str> {
        self.for_connection(connection)
            .iter()
            .map(ServerMessage::event_name)
            .collect()
    }

    pub fn last_for(&self, connection: ConnectionId) -> Option<ServerMessage> {
        self.for_connection(connection).pop()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Outbox for RecordingOutbox {
    fn deliver(&self, connection: ConnectionId, message: &ServerMessage) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((connection, message.clone()));
    }
}

/// How a [`ScriptedEngine`] game plays out.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Report checkmate once this many plies have been played.
    pub checkmate_after: Option<usize>,
    /// Report a draw once this many plies have been played.
    pub draw_after: Option<(usize, DrawReason)>,
    /// `(from, to)` pairs rejected as illegal.
    pub illegal: Vec<(String, String)>,
}

/// Permissive engine for lifecycle tests.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Script,
    turn: Color,
    history: Vec<String>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            turn: Color::White,
            history: Vec::new(),
        }
    }

    fn plies(&self) -> usize {
        self.history.len()
    }
}

impl RulesEngine for ScriptedEngine {
    fn apply_move(&mut self, from: &str, to: &str, promotion: Option<char>) -> Result<AppliedMove, EngineError> {
        if self.is_checkmate() || self.draw_reason().is_some() {
            return Err(EngineError::GameOver);
        }
        let rejected = self.script.illegal.iter().any(|(f, t)| f == from && t == to);
        if from == to || rejected {
            return Err(EngineError::IllegalMove(format!("{from}{to}")));
        }

        let color = self.turn;
        let notation = format!("{from}-{to}");
        self.history.push(notation.clone());
        self.turn = color.opposite();
        Ok(AppliedMove {
            from: from.to_string(),
            to: to.to_string(),
            notation,
            piece: 'p',
            captured: None,
            promotion,
            color,
        })
    }

    fn side_to_move(&self) -> Color {
        self.turn
    }

    fn is_check(&self) -> bool {
        self.is_checkmate()
    }

    fn is_checkmate(&self) -> bool {
        self.script.checkmate_after == Some(self.plies())
    }

    fn draw_reason(&self) -> Option<DrawReason> {
        match self.script.draw_after {
            Some((plies, reason)) if plies == self.plies() => Some(reason),
            _ => None,
        }
    }

    fn serialize_position(&self) -> String {
        format!("scripted:{}:{}", self.plies(), self.turn)
    }

    fn move_history(&self) -> Vec<String> {
        self.history.clone()
    }
}

/// Factory handing out [`ScriptedEngine`]s that share one script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    script: Script,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self { script }
    }

    pub fn checkmate_after(plies: usize) -> Self {
        Self::new(Script {
            checkmate_after: Some(plies),
            ..Default::default()
        })
    }
}

impl RulesEngineFactory for ScriptedFactory {
    fn new_game(&self) -> Box<dyn RulesEngine> {
        Box::new(ScriptedEngine::new(self.script.clone()))
    }
}

/// Builds an initialized coordinator wired to a fresh [`RecordingOutbox`].
///
/// Must be called from within a Tokio runtime.
pub fn recording_coordinator(
    settings: MatchSettings,
    engines: Arc<dyn RulesEngineFactory>,
) -> (Arc<MatchCoordinator>, Arc<RecordingOutbox>) {
    let outbox = RecordingOutbox::new();
    let coordinator = Arc::new(MatchCoordinator::new(settings, engines, outbox.clone()));
    coordinator.init();
    (coordinator, outbox)
}
