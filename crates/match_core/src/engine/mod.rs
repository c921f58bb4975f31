//! Rules engine capability surface.
//!
//! The coordinator never evaluates chess rules itself. Everything it needs to
//! know about legality, check, mate and draws comes through [`RulesEngine`],
//! and new games are obtained from a [`RulesEngineFactory`]. The production
//! implementation lives in [`standard`]; tests may substitute a stub.

use crate::model::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod standard;

pub use standard::{ShakmatyEngine, ShakmatyFactory};

/// Detail of a move the engine accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMove {
    pub from: String,
    pub to: String,
    /// Standard algebraic notation including check/mate suffix.
    pub notation: String,
    /// Lowercase letter of the moved piece (`p`, `n`, `b`, `r`, `q`, `k`).
    pub piece: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
    pub color: Color,
}

/// Why the engine considers the game drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
    /// Both players agreed. Never reported by an engine.
    Agreed,
}

/// Rejections produced by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("invalid promotion piece: {0}")]
    InvalidPromotion(char),

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("game is already over")]
    GameOver,
}

/// One authoritative game in progress.
pub trait RulesEngine: Send + Sync + fmt::Debug {
    /// Validates and plays a move given as `from`/`to` squares.
    ///
    /// # Arguments
    ///
    /// * `from` - Origin square in algebraic form, e.g. `e2`
    /// * `to` - Destination square, e.g. `e4`
    /// * `promotion` - Optional promotion piece letter (`q`, `r`, `b`, `n`)
    ///
    /// # Returns
    ///
    /// Details of the applied move, or an [`EngineError`] when the engine
    /// refuses it. A refused move leaves the position untouched.
    fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<AppliedMove, EngineError>;

    fn side_to_move(&self) -> Color;

    fn is_check(&self) -> bool;

    fn is_checkmate(&self) -> bool;

    /// Draw condition currently on the board, if any.
    fn draw_reason(&self) -> Option<DrawReason>;

    fn is_draw(&self) -> bool {
        self.draw_reason().is_some()
    }

    /// Serialized position (FEN).
    fn serialize_position(&self) -> String;

    /// Moves played so far, in notation order.
    fn move_history(&self) -> Vec<String>;
}

/// Creates engines positioned at the standard initial position.
pub trait RulesEngineFactory: Send + Sync {
    fn new_game(&self) -> Box<dyn RulesEngine>;
}

impl<F: RulesEngineFactory + ?Sized> RulesEngineFactory for Arc<F> {
    fn new_game(&self) -> Box<dyn RulesEngine> {
        (**self).new_game()
    }
}
