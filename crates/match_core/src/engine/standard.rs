//! Standard chess rules backed by `shakmaty`.
//!
//! [`ShakmatyEngine`] keeps the authoritative position, the SAN history and a
//! count of repeated positions (keyed by Zobrist hash) so that threefold
//! repetition can be reported alongside the draw conditions shakmaty detects
//! on its own.

use super::{AppliedMove, DrawReason, EngineError, RulesEngine, RulesEngineFactory};
use crate::model::Color;
use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, zobrist::Zobrist64, CastlingMode, Chess,
    EnPassantMode, Position, Rank, Role, Square,
};
use std::collections::HashMap;

/// Halfmove clock value at which the fifty-move rule applies.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// A single chess game.
#[derive(Debug, Clone)]
pub struct ShakmatyEngine {
    position: Chess,
    history: Vec<String>,
    repetitions: HashMap<u64, u32>,
}

impl ShakmatyEngine {
    /// Creates a game at the standard starting position.
    pub fn new() -> Self {
        Self::with_position(Chess::default())
    }

    /// Creates a game from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| EngineError::IllegalMove(format!("invalid FEN: {e}")))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| EngineError::IllegalMove(format!("invalid FEN: {e}")))?;
        Ok(Self::with_position(position))
    }

    fn with_position(position: Chess) -> Self {
        let mut engine = Self {
            position,
            history: Vec::new(),
            repetitions: HashMap::new(),
        };
        engine.record_position();
        engine
    }

    fn position_key(&self) -> u64 {
        self.position
            .zobrist_hash::<Zobrist64>(EnPassantMode::Legal)
            .0
    }

    fn record_position(&mut self) {
        let key = self.position_key();
        *self.repetitions.entry(key).or_insert(0) += 1;
    }

    fn parse_square(name: &str) -> Result<Square, EngineError> {
        name.trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| EngineError::InvalidSquare(name.to_string()))
    }

    /// Resolves the promotion piece, defaulting to a queen when a pawn
    /// reaches the last rank without an explicit choice.
    fn resolve_promotion(
        &self,
        from: Square,
        to: Square,
        promotion: Option<char>,
    ) -> Result<Option<Role>, EngineError> {
        if let Some(letter) = promotion {
            return match Role::from_char(letter) {
                Some(role @ (Role::Queen | Role::Rook | Role::Bishop | Role::Knight)) => Ok(Some(role)),
                _ => Err(EngineError::InvalidPromotion(letter)),
            };
        }

        let last_rank = self.position.turn().fold_wb(Rank::Eighth, Rank::First);
        let is_pawn = self.position.board().role_at(from) == Some(Role::Pawn);
        Ok((is_pawn && to.rank() == last_rank).then_some(Role::Queen))
    }
}

impl Default for ShakmatyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl From<shakmaty::Color> for Color {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

impl RulesEngine for ShakmatyEngine {
    fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<AppliedMove, EngineError> {
        if self.position.is_game_over() {
            return Err(EngineError::GameOver);
        }

        let from_square = Self::parse_square(from)?;
        let to_square = Self::parse_square(to)?;
        let promotion = self.resolve_promotion(from_square, to_square, promotion)?;

        let candidate = UciMove::Normal {
            from: from_square,
            to: to_square,
            promotion,
        };
        let m = candidate
            .to_move(&self.position)
            .map_err(|_| EngineError::IllegalMove(format!("{from_square}{to_square}")))?;

        let color = self.side_to_move();
        let notation = SanPlus::from_move_and_play_unchecked(&mut self.position, m).to_string();
        self.history.push(notation.clone());
        self.record_position();

        Ok(AppliedMove {
            from: from_square.to_string(),
            to: to_square.to_string(),
            notation,
            piece: m.role().char(),
            captured: m.capture().map(Role::char),
            promotion: m.promotion().map(Role::char),
            color,
        })
    }

    fn side_to_move(&self) -> Color {
        self.position.turn().into()
    }

    fn is_check(&self) -> bool {
        self.position.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    fn draw_reason(&self) -> Option<DrawReason> {
        if self.position.is_stalemate() {
            Some(DrawReason::Stalemate)
        } else if self.position.is_insufficient_material() {
            Some(DrawReason::InsufficientMaterial)
        } else if self.position.halfmoves() >= FIFTY_MOVE_HALFMOVES {
            Some(DrawReason::FiftyMoveRule)
        } else if self.repetitions.get(&self.position_key()).copied().unwrap_or(0) >= 3 {
            Some(DrawReason::ThreefoldRepetition)
        } else {
            None
        }
    }

    fn serialize_position(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    fn move_history(&self) -> Vec<String> {
        self.history.clone()
    }
}

/// Factory producing [`ShakmatyEngine`] games.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyFactory;

impl RulesEngineFactory for ShakmatyFactory {
    fn new_game(&self) -> Box<dyn RulesEngine> {
        Box::new(ShakmatyEngine::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::INITIAL_POSITION;

    fn play(engine: &mut ShakmatyEngine, moves: &[(&str, &str)]) {
        for (from, to) in moves {
            engine
                .apply_move(from, to, None)
                .unwrap_or_else(|e| panic!("{from}{to} should be legal: {e}"));
        }
    }

    #[test]
    fn test_starting_position() {
        let engine = ShakmatyEngine::new();
        assert_eq!(engine.serialize_position(), INITIAL_POSITION);
        assert_eq!(engine.side_to_move(), Color::White);
        assert!(!engine.is_check());
        assert!(engine.draw_reason().is_none());
        assert!(engine.move_history().is_empty());
    }

    #[test]
    fn test_pawn_push_updates_position() {
        let mut engine = ShakmatyEngine::new();
        let applied = engine.apply_move("e2", "e4", None).unwrap();

        assert_eq!(applied.notation, "e4");
        assert_eq!(applied.piece, 'p');
        assert_eq!(applied.color, Color::White);
        assert!(applied.captured.is_none());
        assert_eq!(engine.side_to_move(), Color::Black);
        assert_eq!(engine.move_history(), vec!["e4".to_string()]);
        assert_eq!(
            engine.serialize_position(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn test_illegal_move_leaves_position() {
        let mut engine = ShakmatyEngine::new();
        let before = engine.serialize_position();

        assert!(matches!(
            engine.apply_move("e2", "e5", None),
            Err(EngineError::IllegalMove(_))
        ));
        assert!(matches!(
            engine.apply_move("z9", "e5", None),
            Err(EngineError::InvalidSquare(_))
        ));
        assert_eq!(engine.serialize_position(), before);
        assert!(engine.move_history().is_empty());
    }

    #[test]
    fn test_fools_mate() {
        let mut engine = ShakmatyEngine::new();
        play(&mut engine, &[("f2", "f3"), ("e7", "e5"), ("g2", "g4")]);
        let mate = engine.apply_move("d8", "h4", None).unwrap();

        assert_eq!(mate.notation, "Qh4#");
        assert!(engine.is_checkmate());
        assert!(engine.is_check());
        assert!(matches!(
            engine.apply_move("a2", "a3", None),
            Err(EngineError::GameOver)
        ));
    }

    #[test]
    fn test_en_passant_reports_capture() {
        let mut engine = ShakmatyEngine::new();
        play(&mut engine, &[("e2", "e4"), ("a7", "a6"), ("e4", "e5"), ("d7", "d5")]);
        let capture = engine.apply_move("e5", "d6", None).unwrap();

        assert_eq!(capture.captured, Some('p'));
        assert_eq!(capture.notation, "exd6");
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let mut engine = ShakmatyEngine::from_fen("8/P7/8/8/8/8/8/K6k w - - 0 1").unwrap();
        let applied = engine.apply_move("a7", "a8", None).unwrap();

        assert_eq!(applied.promotion, Some('q'));
        assert!(applied.notation.starts_with("a8=Q"));
    }

    #[test]
    fn test_underpromotion_and_bad_letter() {
        let mut engine = ShakmatyEngine::from_fen("8/P7/8/8/8/8/8/K6k w - - 0 1").unwrap();
        assert!(matches!(
            engine.apply_move("a7", "a8", Some('k')),
            Err(EngineError::InvalidPromotion('k'))
        ));

        let applied = engine.apply_move("a7", "a8", Some('n')).unwrap();
        assert_eq!(applied.promotion, Some('n'));
    }

    #[test]
    fn test_castling_with_king_move() {
        let mut engine = ShakmatyEngine::new();
        play(
            &mut engine,
            &[("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("b8", "c6"), ("f1", "c4"), ("g8", "f6")],
        );
        let castle = engine.apply_move("e1", "g1", None).unwrap();

        assert_eq!(castle.notation, "O-O");
        assert_eq!(castle.piece, 'k');
    }

    #[test]
    fn test_stalemate_is_a_draw() {
        let engine = ShakmatyEngine::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(engine.draw_reason(), Some(DrawReason::Stalemate));
        assert!(!engine.is_checkmate());
    }

    #[test]
    fn test_insufficient_material() {
        let engine = ShakmatyEngine::from_fen("8/8/8/8/8/8/8/K6k w - - 0 1").unwrap();
        assert_eq!(engine.draw_reason(), Some(DrawReason::InsufficientMaterial));
    }

    #[test]
    fn test_fifty_move_rule() {
        let mut engine = ShakmatyEngine::from_fen("8/8/8/8/8/8/R7/K6k w - - 99 60").unwrap();
        assert!(engine.draw_reason().is_none());
        engine.apply_move("a2", "b2", None).unwrap();
        assert_eq!(engine.draw_reason(), Some(DrawReason::FiftyMoveRule));
    }

    #[test]
    fn test_threefold_repetition() {
        let mut engine = ShakmatyEngine::new();
        let shuffle = [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")];
        play(&mut engine, &shuffle);
        assert!(engine.draw_reason().is_none());
        play(&mut engine, &shuffle);
        assert_eq!(engine.draw_reason(), Some(DrawReason::ThreefoldRepetition));
    }
}
