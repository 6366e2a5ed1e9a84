// Rules adapter: the only place chess legality is decided.
//
// The coordinator (`session.rs`) treats the rules as an opaque capability
// behind the `GameRules` trait: ask whose turn it is, ask for the canonical
// snapshot (FEN) and terminal status, and try to apply a `MoveRequest`.
// `apply_move` is a pure function of `&self`: it returns the successor state
// rather than mutating, so the coordinator can commit it in one assignment
// and nothing half-applied is ever observable.
//
// `StandardChess` is the production implementation over `shakmaty::Chess`.
// Two request quirks are smoothed over here rather than in clients:
// - A promotion piece on a move that is not a promotion is dropped. Browser
//   clients always attach `promotion: "q"` to every drag-and-drop move.
// - Castling arrives as the king's two-square move (`e1g1`), which is how
//   `CastlingMode::Standard` UCI already reads it.

use chess_table_protocol::types::{GamePhase, GameStatus, MoveRecord, MoveRequest, Promotion, Seat};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role};
use thiserror::Error;

/// Errors produced by the rules adapter.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    /// Wrong piece ownership, blocked path, leaves king in check, etc.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("game is already over")]
    GameOver,
}

/// Capability the coordinator needs from a rules engine.
pub trait GameRules: Sized {
    /// Seat whose turn it is in this state.
    fn side_to_move(&self) -> Seat;

    /// Canonical text snapshot (FEN for chess).
    fn fen(&self) -> String;

    fn status(&self) -> GameStatus;

    /// Validate `request` against this state. On success returns the
    /// successor state and the normalized move; `self` is never modified.
    fn apply_move(&self, request: &MoveRequest) -> Result<(Self, MoveRecord), RuleError>;
}

/// Standard chess rules backed by shakmaty.
#[derive(Debug, Clone, Default)]
pub struct StandardChess {
    position: Chess,
}

impl StandardChess {
    /// Standard starting position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, RuleError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| RuleError::InvalidFen(format!("{e}")))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| RuleError::InvalidFen(format!("{e}")))?;
        Ok(Self { position })
    }

    /// Turn a request into a legal shakmaty move, dropping a superfluous
    /// promotion piece if that is what makes it legal.
    fn resolve(&self, request: &MoveRequest) -> Result<Move, RuleError> {
        match self.to_legal_move(request) {
            Ok(m) => Ok(m),
            Err(err) if request.promotion.is_some() => {
                let plain = MoveRequest {
                    promotion: None,
                    ..request.clone()
                };
                match self.to_legal_move(&plain) {
                    Ok(m) if m.promotion().is_none() => Ok(m),
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    fn to_legal_move(&self, request: &MoveRequest) -> Result<Move, RuleError> {
        let uci: UciMove = request
            .to_string()
            .parse()
            .map_err(|_| RuleError::IllegalMove(request.to_string()))?;
        uci.to_move(&self.position)
            .map_err(|_| RuleError::IllegalMove(request.to_string()))
    }
}

impl GameRules for StandardChess {
    fn side_to_move(&self) -> Seat {
        seat_of(self.position.turn())
    }

    fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    fn status(&self) -> GameStatus {
        let phase = if self.position.is_checkmate() {
            GamePhase::Checkmate
        } else if self.position.is_stalemate() {
            GamePhase::Stalemate
        } else if self.position.is_check() {
            GamePhase::Check
        } else if self.position.is_insufficient_material() {
            GamePhase::InsufficientMaterial
        } else {
            GamePhase::Ongoing
        };
        GameStatus {
            phase,
            side_to_move: self.side_to_move(),
        }
    }

    fn apply_move(&self, request: &MoveRequest) -> Result<(Self, MoveRecord), RuleError> {
        if self.status().phase.is_terminal() {
            return Err(RuleError::GameOver);
        }

        let m = self.resolve(request)?;
        let seat = self.side_to_move();
        // SAN depends on the position before the move.
        let san = San::from_move(&self.position, &m);
        let next = self
            .position
            .clone()
            .play(&m)
            .map_err(|_| RuleError::IllegalMove(request.to_string()))?;
        debug_assert_eq!(seat_of(next.turn()), seat.opposite());

        let suffix = if next.is_checkmate() {
            "#"
        } else if next.is_check() {
            "+"
        } else {
            ""
        };

        let record = MoveRecord {
            seat,
            from: request.from,
            to: request.to,
            promotion: m.promotion().and_then(promotion_of),
            uci: UciMove::from_move(&m, CastlingMode::Standard).to_string(),
            san: format!("{san}{suffix}"),
        };
        Ok((Self { position: next }, record))
    }
}

fn seat_of(color: Color) -> Seat {
    match color {
        Color::White => Seat::White,
        Color::Black => Seat::Black,
    }
}

fn promotion_of(role: Role) -> Option<Promotion> {
    match role {
        Role::Queen => Some(Promotion::Queen),
        Role::Rook => Some(Promotion::Rook),
        Role::Bishop => Some(Promotion::Bishop),
        Role::Knight => Some(Promotion::Knight),
        Role::Pawn | Role::King => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn mv(from: &str, to: &str) -> MoveRequest {
        MoveRequest::parse(from, to).unwrap()
    }

    fn play(rules: &StandardChess, from: &str, to: &str) -> StandardChess {
        rules.apply_move(&mv(from, to)).unwrap().0
    }

    #[test]
    fn starting_position() {
        let rules = StandardChess::new();
        assert_eq!(rules.fen(), START_FEN);
        assert_eq!(rules.side_to_move(), Seat::White);
        assert_eq!(rules.status().phase, GamePhase::Ongoing);
    }

    #[test]
    fn legal_move_advances_turn_and_leaves_original() {
        let rules = StandardChess::new();
        let (next, record) = rules.apply_move(&mv("e2", "e4")).unwrap();

        assert_eq!(next.side_to_move(), Seat::Black);
        assert_eq!(record.seat, Seat::White);
        assert_eq!(record.uci, "e2e4");
        assert_eq!(record.san, "e4");
        assert_eq!(record.promotion, None);
        // The source state is untouched.
        assert_eq!(rules.fen(), START_FEN);
        assert_ne!(next.fen(), START_FEN);
    }

    #[test]
    fn illegal_moves_rejected() {
        let rules = StandardChess::new();
        // Pawn three squares.
        assert!(matches!(
            rules.apply_move(&mv("e2", "e5")),
            Err(RuleError::IllegalMove(_))
        ));
        // Black piece on White's turn.
        assert!(matches!(
            rules.apply_move(&mv("e7", "e5")),
            Err(RuleError::IllegalMove(_))
        ));
        // Empty square.
        assert!(matches!(
            rules.apply_move(&mv("e4", "e5")),
            Err(RuleError::IllegalMove(_))
        ));
    }

    #[test]
    fn superfluous_promotion_is_ignored() {
        let rules = StandardChess::new();
        let request = mv("g1", "f3").with_promotion(Promotion::Queen);
        let (_, record) = rules.apply_move(&request).unwrap();
        assert_eq!(record.san, "Nf3");
        assert_eq!(record.uci, "g1f3");
        assert_eq!(record.promotion, None);
    }

    #[test]
    fn promotion_requires_piece() {
        let rules = StandardChess::from_fen("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        assert!(rules.apply_move(&mv("a7", "a8")).is_err());

        let (_, record) = rules
            .apply_move(&mv("a7", "a8").with_promotion(Promotion::Knight))
            .unwrap();
        assert_eq!(record.promotion, Some(Promotion::Knight));
        assert_eq!(record.uci, "a7a8n");
        assert_eq!(record.san, "a8=N");
    }

    #[test]
    fn castling_by_king_move() {
        let rules =
            StandardChess::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let (next, record) = rules.apply_move(&mv("e1", "g1")).unwrap();
        assert_eq!(record.san, "O-O");
        assert_eq!(record.uci, "e1g1");
        assert!(next.fen().starts_with("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R4RK1 b kq"));
    }

    #[test]
    fn fools_mate_ends_the_game() {
        let mut rules = StandardChess::new();
        rules = play(&rules, "f2", "f3");
        rules = play(&rules, "e7", "e5");
        rules = play(&rules, "g2", "g4");
        let (mated, record) = rules.apply_move(&mv("d8", "h4")).unwrap();
        assert_eq!(record.san, "Qh4#");

        let status = mated.status();
        assert_eq!(status.phase, GamePhase::Checkmate);
        assert_eq!(status.side_to_move, Seat::White);
        assert!(matches!(
            mated.apply_move(&mv("e2", "e4")),
            Err(RuleError::GameOver)
        ));
    }

    #[test]
    fn check_reported() {
        let rules = StandardChess::from_fen(
            "rnbqkbnr/ppppp1pp/8/5p1Q/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 2",
        )
        .unwrap();
        assert_eq!(rules.status().phase, GamePhase::Check);
        assert_eq!(rules.side_to_move(), Seat::Black);
    }

    #[test]
    fn stalemate_reported() {
        let rules = StandardChess::from_fen("8/8/8/8/8/6q1/5k2/7K w - - 0 1").unwrap();
        assert_eq!(rules.status().phase, GamePhase::Stalemate);
        assert!(matches!(
            rules.apply_move(&mv("h1", "g1")),
            Err(RuleError::GameOver)
        ));
    }

    #[test]
    fn fen_snapshot_round_trips() {
        let rules = play(&play(&StandardChess::new(), "e2", "e4"), "c7", "c5");
        let restored = StandardChess::from_fen(&rules.fen()).unwrap();
        assert_eq!(restored.fen(), rules.fen());
        assert_eq!(restored.side_to_move(), Seat::White);
    }

    #[test]
    fn invalid_fen_rejected() {
        assert!(matches!(
            StandardChess::from_fen("not a fen"),
            Err(RuleError::InvalidFen(_))
        ));
    }
}
