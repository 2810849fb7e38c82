/*!
Per-match state machine.

A [`Game`] binds two usernames to a chess position and drives it move by
move: UCI parsing, legality, turn alternation and termination detection.
It carries no lock of its own; the game manager serializes all access.
*/

use crate::errors::*;

use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

/// FEN of the standard starting position.
pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Winner sentinel recorded when a game ends in a draw.
pub const DRAW_WINNER: &str = "<draw>";

/// Why a game terminated.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
    /// A participant disconnected mid-game; the other side wins.
    Forfeit,
}

impl EndReason {
    /// The reason string sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::InsufficientMaterial => "insufficient material",
            Self::FiftyMoveRule => "fifty move rule",
            Self::ThreefoldRepetition => "threefold repetition",
            Self::Forfeit => "opponent_disconnected",
        }
    }
}

/// Outcome from the perspective of the side to move at termination.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EndResult {
    Draw,
    /// The side to move has no legal escape; the previous mover wins.
    Lose,
}

/// A single match between two players.
#[derive(Debug, Clone)]
pub struct Game {
    game_id: String,
    white: String,
    black: String,
    current_turn: String,
    half_moves: u16,
    over: bool,
    winner: String,
    reason: Option<EndReason>,
    result: Option<EndResult>,
    pos: Chess,
    // Zobrist hashes of every position seen, starting position included.
    history: Vec<Zobrist64>,
}

impl Game {
    /// Set up a match from a starting FEN. The side to move in the FEN
    /// decides whose turn it is.
    pub fn new(game_id: String, white: String, black: String, starting_fen: &str) -> ChessdResult<Self> {
        let fen: Fen = starting_fen.parse().map_err(|_| {
            Error::from(InvalidValue {
                expected: format!("parsable FEN, got {:?}", starting_fen),
            })
        })?;
        let pos: Chess = fen.into_position(CastlingMode::Standard).map_err(|_| {
            Error::from(InvalidValue {
                expected: format!("legal FEN position, got {:?}", starting_fen),
            })
        })?;

        let current_turn = if pos.turn() == Color::White {
            white.clone()
        } else {
            black.clone()
        };
        let history = vec![pos.zobrist_hash(EnPassantMode::Legal)];

        Ok(Self {
            game_id,
            white,
            black,
            current_turn,
            half_moves: 0,
            over: false,
            winner: String::new(),
            reason: None,
            result: None,
            pos,
            history,
        })
    }

    /// Try to apply a move for the side to move.
    ///
    /// Returns `false` without touching any state when the UCI string
    /// does not parse, names a move absent from the legal-move list, or
    /// the game is already over. On success the half-move count is
    /// bumped and either the turn toggles or the game terminates.
    pub fn try_move(&mut self, uci_move: &str) -> bool {
        if self.over {
            return false;
        }

        let uci = match Uci::from_ascii(uci_move.as_bytes()) {
            Ok(uci) => uci,
            Err(_) => return false,
        };
        let m = match uci.to_move(&self.pos) {
            Ok(m) => m,
            Err(_) => return false,
        };
        if !self.pos.legal_moves().contains(&m) {
            return false;
        }

        self.pos.play_unchecked(&m);
        self.half_moves += 1;
        self.history.push(self.pos.zobrist_hash(EnPassantMode::Legal));

        match self.evaluate_end() {
            Some((reason, result)) => {
                self.over = true;
                self.reason = Some(reason);
                self.result = Some(result);
                self.winner = match result {
                    // The mover just left the opponent without an escape.
                    EndResult::Lose => self.current_turn.clone(),
                    EndResult::Draw => DRAW_WINNER.to_owned(),
                };
            }
            None => self.toggle_turn(),
        }

        true
    }

    /// True iff the king of the side to move is attacked.
    pub fn is_in_check(&self) -> bool {
        self.pos.is_check()
    }

    /// Terminate as a forfeit by `leaver`; the other participant wins.
    pub fn forfeit(&mut self, leaver: &str) {
        self.over = true;
        self.reason = Some(EndReason::Forfeit);
        self.result = Some(EndResult::Lose);
        self.winner = self.opponent_of(leaver).to_owned();
    }

    pub fn opponent_of(&self, username: &str) -> &str {
        if username == self.white {
            &self.black
        } else {
            &self.white
        }
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn white(&self) -> &str {
        &self.white
    }

    pub fn black(&self) -> &str {
        &self.black
    }

    pub fn current_turn(&self) -> &str {
        &self.current_turn
    }

    pub fn half_moves(&self) -> u16 {
        self.half_moves
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    /// The winning username, [`DRAW_WINNER`] on a draw, empty while the
    /// game is still running.
    pub fn winner(&self) -> &str {
        &self.winner
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.reason
    }

    pub fn end_result(&self) -> Option<EndResult> {
        self.result
    }

    fn toggle_turn(&mut self) {
        self.current_turn = if self.current_turn == self.white {
            self.black.clone()
        } else {
            self.white.clone()
        };
    }

    fn evaluate_end(&self) -> Option<(EndReason, EndResult)> {
        if self.pos.is_checkmate() {
            return Some((EndReason::Checkmate, EndResult::Lose));
        }
        if self.pos.is_stalemate() {
            return Some((EndReason::Stalemate, EndResult::Draw));
        }
        if self.pos.is_insufficient_material() {
            return Some((EndReason::InsufficientMaterial, EndResult::Draw));
        }
        // The engine's halfmove clock counts plies since the last
        // capture or pawn move; 100 plies is the fifty-move rule.
        if self.pos.halfmoves() >= 100 {
            return Some((EndReason::FiftyMoveRule, EndResult::Draw));
        }
        if self.repetitions() >= 3 {
            return Some((EndReason::ThreefoldRepetition, EndResult::Draw));
        }
        None
    }

    // How many times the current position has occurred, itself included.
    fn repetitions(&self) -> usize {
        let current = match self.history.last() {
            Some(hash) => *hash,
            None => return 0,
        };
        self.history.iter().filter(|hash| **hash == current).count()
    }
}
