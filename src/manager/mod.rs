/*!
Matchmaking and game lifecycle.

The manager owns the two live tables (running games and pairings
awaiting acceptance) behind one mutex, plus the FIFO matchmaking
queue behind its own mutex and condition variable. A single background
matchmaker thread pairs waiting players whose ratings are close enough
and starts the accept/decline handshake.

Lock order is always manager tables → connection table → per-connection
send guard. The matchmaking mutex is never held while taking another
lock.
*/

use crate::game::{EndReason, Game, DRAW_WINNER, STARTPOS};
use crate::protocol::{
    AutoMatchFound, GameEnd, GameStart, GameStatusUpdate, MatchDeclinedNotification, Message,
    MoveError,
};
use crate::server::{self, ConnectionId, Outbound};
use crate::store::UserStore;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use chrono::Local;

/// Rating transferred from loser to winner on a decisive result.
const ELO_K: u16 = 16;

/// Pause between matchmaker rounds so repeated rejections don't spin.
const MATCH_QUANTUM: Duration = Duration::from_secs(1);

/// A proposed game waiting for both players to accept.
struct PendingPairing {
    game: Game,
    player_a: ConnectionId,
    player_b: ConnectionId,
    a_accepted: bool,
    b_accepted: bool,
}

#[derive(Default)]
struct Tables {
    games: HashMap<String, Game>,
    pending: HashMap<String, PendingPairing>,
}

#[derive(Default)]
struct MatchQueue {
    entries: VecDeque<ConnectionId>,
    stop: bool,
}

/// Owns live games and pending pairings, runs the matchmaker and
/// orchestrates move handling. Sends only through the narrow
/// [`Outbound`] interface.
pub struct GameManager {
    tables: Mutex<Tables>,
    queue: Mutex<MatchQueue>,
    queue_signal: Condvar,
    out: Arc<dyn Outbound>,
    store: Arc<UserStore>,
    elo_threshold: u16,
    game_seq: AtomicU64,
}

impl GameManager {
    pub fn new(out: Arc<dyn Outbound>, store: Arc<UserStore>, elo_threshold: u16) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            queue: Mutex::new(MatchQueue::default()),
            queue_signal: Condvar::new(),
            out,
            store,
            elo_threshold,
            game_seq: AtomicU64::new(0),
        }
    }

    /// Append a player to the matchmaking queue and wake the matcher.
    /// The caller ensures a player is not enqueued twice.
    pub fn add_player(&self, conn: ConnectionId) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.entries.push_back(conn);
        }
        self.queue_signal.notify_one();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().entries.len()
    }

    /// Spawn the background matchmaker thread.
    pub fn start_matcher(self: Arc<Self>) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("matchmaker".to_owned())
            .spawn(move || self.matchmaking_loop())
            .expect("failed to spawn the matchmaker thread")
    }

    /// Ask the matchmaker thread to exit after its current round.
    pub fn stop_matcher(&self) {
        self.queue.lock().unwrap().stop = true;
        self.queue_signal.notify_all();
    }

    fn matchmaking_loop(&self) {
        info!("matchmaker running");

        loop {
            let (c1, c2) = {
                let queue = self.queue.lock().unwrap();
                let mut queue = self
                    .queue_signal
                    .wait_while(queue, |q| q.entries.len() < 2 && !q.stop)
                    .unwrap();

                if queue.stop {
                    break;
                }

                match (queue.entries.pop_front(), queue.entries.pop_front()) {
                    (Some(c1), Some(c2)) => (c1, c2),
                    _ => continue,
                }
            };

            self.match_pair(c1, c2);

            thread::sleep(MATCH_QUANTUM);
        }

        info!("matchmaker stopped");
    }

    /// One matchmaking round over the two oldest queue entries:
    /// propose a pairing, or push both back when their ratings are too
    /// far apart. Returns whether a pairing was proposed.
    pub(crate) fn match_pair(&self, c1: ConnectionId, c2: ConnectionId) -> bool {
        let (username1, username2) = match (self.out.username_for(c1), self.out.username_for(c2)) {
            (Some(u1), Some(u2)) => (u1, u2),
            // A dead entry drops out; its companion keeps queue priority.
            (Some(_), None) => {
                self.requeue_front(c1);
                return false;
            }
            (None, Some(_)) => {
                self.requeue_front(c2);
                return false;
            }
            (None, None) => return false,
        };

        let (elo1, elo2) = match (self.store.elo(&username1), self.store.elo(&username2)) {
            (Some(e1), Some(e2)) => (e1, e2),
            _ => {
                error!(
                    "queued players {:?}/{:?} missing from the user store",
                    username1, username2
                );
                return false;
            }
        };

        if (i32::from(elo1) - i32::from(elo2)).abs() > i32::from(self.elo_threshold) {
            debug!(
                "not pairing {} ({}) with {} ({}): rating gap too large",
                username1, elo1, username2, elo2
            );
            let mut queue = self.queue.lock().unwrap();
            queue.entries.push_back(c1);
            queue.entries.push_back(c2);
            return false;
        }

        let game_id = self.next_game_id(&username1, &username2);
        let game = match Game::new(
            game_id.clone(),
            username1.clone(),
            username2.clone(),
            STARTPOS,
        ) {
            Ok(game) => game,
            Err(err) => {
                error!("failed to set up game {}: {:?}", game_id, err);
                return false;
            }
        };

        info!(
            "proposing game {}: {} ({}) vs {} ({})",
            game_id, username1, elo1, username2, elo2
        );

        let mut tables = self.tables.lock().unwrap();
        tables.pending.insert(
            game_id.clone(),
            PendingPairing {
                game,
                player_a: c1,
                player_b: c2,
                a_accepted: false,
                b_accepted: false,
            },
        );

        self.send(
            c1,
            &AutoMatchFound {
                opponent_username: username2,
                opponent_elo: elo2,
                game_id: game_id.clone(),
            },
        );
        self.send(
            c2,
            &AutoMatchFound {
                opponent_username: username1,
                opponent_elo: elo1,
                game_id,
            },
        );

        true
    }

    /// Record one side's acceptance; once both sides accept, the
    /// pairing becomes a live game and both players get `GAME_START`.
    pub fn handle_accept(&self, conn: ConnectionId, game_id: &str) {
        let mut tables = self.tables.lock().unwrap();

        let ready = match tables.pending.get_mut(game_id) {
            Some(pairing) => {
                if conn == pairing.player_a {
                    pairing.a_accepted = true;
                } else if conn == pairing.player_b {
                    pairing.b_accepted = true;
                } else {
                    error!("connection {} is not part of pairing {}", conn, game_id);
                    return;
                }
                pairing.a_accepted && pairing.b_accepted
            }
            None => {
                error!("acceptance for unknown pairing {}", game_id);
                return;
            }
        };

        if !ready {
            return;
        }

        if let Some(pairing) = tables.pending.remove(game_id) {
            let start = GameStart {
                game_id: game_id.to_owned(),
                player1: pairing.game.white().to_owned(),
                player2: pairing.game.black().to_owned(),
                starting_player: pairing.game.current_turn().to_owned(),
                fen: pairing.game.fen(),
            };

            info!("game {} starting: {} vs {}", game_id, start.player1, start.player2);

            let (player_a, player_b) = (pairing.player_a, pairing.player_b);
            tables.games.insert(game_id.to_owned(), pairing.game);

            self.send(player_a, &start);
            self.send(player_b, &start);
        }
    }

    /// Drop the pairing, notify the peer and put them back in the
    /// queue.
    pub fn handle_decline(&self, conn: ConnectionId, game_id: &str) {
        let peer = {
            let mut tables = self.tables.lock().unwrap();
            let pairing = match tables.pending.remove(game_id) {
                Some(pairing) => pairing,
                None => {
                    error!("decline for unknown pairing {}", game_id);
                    return;
                }
            };

            if conn != pairing.player_a && conn != pairing.player_b {
                error!("connection {} is not part of pairing {}", conn, game_id);
                tables.pending.insert(game_id.to_owned(), pairing);
                return;
            }

            if conn == pairing.player_a {
                pairing.player_b
            } else {
                pairing.player_a
            }
        };

        info!("pairing {} declined by connection {}", game_id, conn);

        self.send(
            peer,
            &MatchDeclinedNotification {
                game_id: game_id.to_owned(),
            },
        );
        self.add_player(peer);
    }

    /// Validate and apply one move, then fan the authoritative state
    /// out to both participants. Every failure path answers the mover
    /// with exactly one `MOVE_ERROR`.
    ///
    /// The whole handler runs under the tables lock, so updates for a
    /// single game are totally ordered and `GAME_END` is the last
    /// packet sent about it.
    pub fn handle_move(&self, conn: ConnectionId, game_id: &str, uci_move: &str) {
        let username = match self.out.username_for(conn) {
            Some(username) => username,
            None => {
                warn!("move from unbound connection {}", conn);
                self.send_move_error(conn, game_id, "not_a_participant");
                return;
            }
        };

        let mut tables = self.tables.lock().unwrap();

        let game = match tables.games.get_mut(game_id) {
            Some(game) => game,
            None => {
                self.send_move_error(conn, game_id, "game_not_found");
                return;
            }
        };

        if username != game.white() && username != game.black() {
            self.send_move_error(conn, game_id, "not_a_participant");
            return;
        }
        if username != game.current_turn() {
            self.send_move_error(conn, game_id, "not_your_turn");
            return;
        }
        if !game.try_move(uci_move) {
            self.send_move_error(conn, game_id, "illegal_move");
            return;
        }

        let white = game.white().to_owned();
        let black = game.black().to_owned();
        let over = game.is_over();

        let status = GameStatusUpdate {
            game_id: game_id.to_owned(),
            fen: game.fen(),
            current_turn: game.current_turn().to_owned(),
            is_over: over,
            note: if !over && game.is_in_check() {
                "Check!".to_owned()
            } else {
                String::new()
            },
        };
        self.send_to_user(&white, &status);
        self.send_to_user(&black, &status);

        if over {
            let end = GameEnd {
                game_id: game_id.to_owned(),
                winner: game.winner().to_owned(),
                reason: game
                    .end_reason()
                    .map(EndReason::as_str)
                    .unwrap_or("")
                    .to_owned(),
                half_move_count: game.half_moves(),
            };

            info!(
                "game {} over: winner {:?}, reason {:?}, {} half-moves",
                game_id, end.winner, end.reason, end.half_move_count
            );

            self.send_to_user(&white, &end);
            self.send_to_user(&black, &end);

            tables.games.remove(game_id);
            drop(tables);

            self.apply_elo(&end.winner, &white, &black);
        }
    }

    /// Disconnect hook: the player leaves the matchmaking queue, a
    /// pending pairing dies like a decline, and an active game is
    /// forfeited to the opponent.
    pub fn handle_disconnect(&self, conn: ConnectionId) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.entries.retain(|&queued| queued != conn);
        }

        let pending_id = {
            let tables = self.tables.lock().unwrap();
            tables
                .pending
                .iter()
                .find(|(_, p)| p.player_a == conn || p.player_b == conn)
                .map(|(game_id, _)| game_id.clone())
        };
        if let Some(game_id) = pending_id {
            info!(
                "connection {} disconnected while pairing {} was pending",
                conn, game_id
            );
            self.handle_decline(conn, &game_id);
            return;
        }

        let username = match self.out.username_for(conn) {
            Some(username) => username,
            None => return,
        };

        let live_id = {
            let tables = self.tables.lock().unwrap();
            tables
                .games
                .iter()
                .find(|(_, g)| g.white() == username || g.black() == username)
                .map(|(game_id, _)| game_id.clone())
        };
        if let Some(game_id) = live_id {
            let game = {
                let mut tables = self.tables.lock().unwrap();
                match tables.games.remove(&game_id) {
                    Some(mut game) => {
                        game.forfeit(&username);
                        game
                    }
                    None => return,
                }
            };

            info!("game {} forfeited by {}", game_id, username);

            let end = GameEnd {
                game_id,
                winner: game.winner().to_owned(),
                reason: EndReason::Forfeit.as_str().to_owned(),
                half_move_count: game.half_moves(),
            };
            self.send_to_user(game.winner(), &end);

            self.apply_elo(&end.winner, game.white(), game.black());
        }
    }

    // Monotonic suffix instead of raw millis so simultaneous creations
    // cannot collide.
    fn next_game_id(&self, white: &str, black: &str) -> String {
        let seq = self.game_seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "game_{}_{}_{}_{}",
            white,
            black,
            Local::now().format("%Y%m%d%H%M%S"),
            seq
        )
    }

    fn requeue_front(&self, conn: ConnectionId) {
        let mut queue = self.queue.lock().unwrap();
        queue.entries.push_front(conn);
    }

    fn apply_elo(&self, winner: &str, white: &str, black: &str) {
        if winner == DRAW_WINNER || winner.is_empty() {
            return;
        }
        let loser = if winner == white { black } else { white };

        if let (Some(winner_elo), Some(loser_elo)) =
            (self.store.elo(winner), self.store.elo(loser))
        {
            self.store.update_elo(winner, winner_elo.saturating_add(ELO_K));
            self.store.update_elo(loser, loser_elo.saturating_sub(ELO_K));
        }
    }

    fn send<M: Message>(&self, conn: ConnectionId, message: &M) {
        if let Err(err) = server::send_message(self.out.as_ref(), conn, message) {
            warn!(
                "failed to send {:?} to connection {}: {:?}",
                M::KIND,
                conn,
                err
            );
        }
    }

    fn send_to_user<M: Message>(&self, username: &str, message: &M) {
        if let Err(err) = server::send_message_to(self.out.as_ref(), username, message) {
            warn!("failed to send {:?} to {:?}: {:?}", M::KIND, username, err);
        }
    }

    fn send_move_error(&self, conn: ConnectionId, game_id: &str, reason: &str) {
        self.send(
            conn,
            &MoveError {
                game_id: game_id.to_owned(),
                reason: reason.to_owned(),
            },
        );
    }
}
