//! Payload layouts for every message kind.
//!
//! Field order is wire order. Reply messages carry human-readable
//! `reason` strings; they are part of the protocol and must not change
//! spelling between releases.

use crate::errors::*;
use crate::protocol::{Readable, Writable};

use std::io;

messages! {
    // Register ----------

    /// Request a new account.
    (Register) Register {
        username: String,
    }

    /// The account was created; echoes the starting rating.
    (RegisterSuccess) RegisterSuccess {
        username: String,
        elo: u16,
    }

    (RegisterFailure) RegisterFailure {
        reason: String,
    }

    // Login -------------

    /// Bind this connection to an existing account.
    (Login) Login {
        username: String,
    }

    (LoginSuccess) LoginSuccess {
        username: String,
        elo: u16,
    }

    (LoginFailure) LoginFailure {
        reason: String,
    }

    // Player list -------

    /// Ask for the roster of registered players.
    (RequestPlayerList) RequestPlayerList {}

    (PlayerList) PlayerList {
        players: Vec<PlayerEntry>,
    }

    // Auto match --------

    /// Enter the matchmaking queue.
    (AutoMatchRequest) AutoMatchRequest {
        username: String,
    }

    /// A candidate opponent was found; awaits accept/decline from both
    /// sides.
    (AutoMatchFound) AutoMatchFound {
        opponent_username: String,
        opponent_elo: u16,
        game_id: String,
    }

    (AutoMatchAccepted) AutoMatchAccepted {
        game_id: String,
    }

    (AutoMatchDeclined) AutoMatchDeclined {
        game_id: String,
    }

    /// Tells the remaining player their proposed match fell through.
    (MatchDeclinedNotification) MatchDeclinedNotification {
        game_id: String,
    }

    // Game --------------

    /// Both sides accepted; the game is live.
    (GameStart) GameStart {
        game_id: String,
        player1: String,
        player2: String,
        starting_player: String,
        fen: String,
    }

    /// A move in UCI notation, e.g. `e2e4` or `e7e8q`.
    (Move) Move {
        game_id: String,
        uci_move: String,
    }

    /// Sent only to the offending player; the game state is unchanged.
    (MoveError) MoveError {
        game_id: String,
        reason: String,
    }

    /// Authoritative position after an accepted move, fanned out to
    /// both participants.
    (GameStatusUpdate) GameStatusUpdate {
        game_id: String,
        fen: String,
        current_turn: String,
        is_over: bool,
        note: String,
    }

    /// The last packet ever sent about a game.
    (GameEnd) GameEnd {
        game_id: String,
        winner: String,
        reason: String,
        half_move_count: u16,
    }
}

/// One row of the [`PlayerList`] roster.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PlayerEntry {
    pub username: String,
    pub elo: u16,
}

impl Readable for PlayerEntry {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> ChessdResult<Self> {
        Ok(Self {
            username: String::read_from(buf)?,
            elo: u16::read_from(buf)?,
        })
    }
}

impl Writable for PlayerEntry {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> ChessdResult<()> {
        self.username.write_to(buf)?;
        self.elo.write_to(buf)
    }
}
