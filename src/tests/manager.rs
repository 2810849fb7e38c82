use crate::errors::*;
use crate::game::{DRAW_WINNER, STARTPOS};
use crate::manager::GameManager;
use crate::protocol::*;
use crate::server::{ConnectionId, Outbound};
use crate::store::UserStore;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the network server: remembers username
/// bindings and records every packet instead of writing to sockets.
#[derive(Default)]
struct RecordingOutbound {
    usernames: Mutex<HashMap<ConnectionId, String>>,
    sent: Mutex<Vec<(ConnectionId, MessageType, Vec<u8>)>>,
}

impl RecordingOutbound {
    /// Decoded copies of every `M` sent to a connection, in order.
    fn messages_of<M: Message>(&self, conn: ConnectionId) -> Vec<M> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, kind, _)| *to == conn && *kind == M::KIND)
            .map(|(_, _, payload)| M::decode(payload).unwrap())
            .collect()
    }

    /// Raw payloads of every `M` sent to a connection.
    fn payloads_of<M: Message>(&self, conn: ConnectionId) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, kind, _)| *to == conn && *kind == M::KIND)
            .map(|(_, _, payload)| payload.clone())
            .collect()
    }

    fn drop_binding(&self, conn: ConnectionId) {
        self.usernames.lock().unwrap().remove(&conn);
    }
}

impl Outbound for RecordingOutbound {
    fn send_packet(&self, conn: ConnectionId, kind: MessageType, payload: &[u8]) -> ChessdResult<()> {
        self.sent.lock().unwrap().push((conn, kind, payload.to_vec()));
        Ok(())
    }

    fn send_to_username(&self, username: &str, kind: MessageType, payload: &[u8]) -> ChessdResult<()> {
        match self.conn_for_username(username) {
            Some(conn) => self.send_packet(conn, kind, payload),
            None => Err(Error::from(InvalidValue {
                expected: format!("a connection bound to {:?}", username),
            })),
        }
    }

    fn conn_for_username(&self, username: &str) -> Option<ConnectionId> {
        self.usernames
            .lock()
            .unwrap()
            .iter()
            .find(|(_, bound)| bound.as_str() == username)
            .map(|(conn, _)| *conn)
    }

    fn username_for(&self, conn: ConnectionId) -> Option<String> {
        self.usernames.lock().unwrap().get(&conn).cloned()
    }

    fn is_logged_in(&self, username: &str) -> bool {
        self.conn_for_username(username).is_some()
    }

    fn bind_username(&self, conn: ConnectionId, username: &str) {
        self.usernames
            .lock()
            .unwrap()
            .insert(conn, username.to_owned());
    }
}

struct Fixture {
    out: Arc<RecordingOutbound>,
    manager: Arc<GameManager>,
    store: Arc<UserStore>,
    _dir: tempfile::TempDir,
}

/// Registered players bound as connection 1, 2, ... in order.
fn fixture(players: &[(&str, u16)]) -> Fixture {
    super::init_logger();

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(UserStore::open(dir.path().join("users.json"), 1200).unwrap());
    let out = Arc::new(RecordingOutbound::default());

    for (index, (username, elo)) in players.iter().enumerate() {
        store.register(username).unwrap();
        store.update_elo(username, *elo);
        out.bind_username(index as ConnectionId + 1, username);
    }

    let manager = Arc::new(GameManager::new(
        Arc::clone(&out) as Arc<dyn Outbound>,
        Arc::clone(&store),
        200,
    ));

    Fixture {
        out,
        manager,
        store,
        _dir: dir,
    }
}

/// Propose and fully accept a game between connections 1 and 2;
/// returns the game id.
fn start_game(fx: &Fixture) -> String {
    assert!(fx.manager.match_pair(1, 2));

    let found: Vec<AutoMatchFound> = fx.out.messages_of(1);
    let game_id = found[0].game_id.clone();

    fx.manager.handle_accept(1, &game_id);
    fx.manager.handle_accept(2, &game_id);
    game_id
}

#[test]
fn test_pairing_sends_opposite_opponents() {
    let fx = fixture(&[("alice", 1200), ("bob", 1250)]);

    assert!(fx.manager.match_pair(1, 2));

    let to_alice: Vec<AutoMatchFound> = fx.out.messages_of(1);
    let to_bob: Vec<AutoMatchFound> = fx.out.messages_of(2);

    assert_eq!(to_alice.len(), 1);
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_alice[0].opponent_username, "bob");
    assert_eq!(to_alice[0].opponent_elo, 1250);
    assert_eq!(to_bob[0].opponent_username, "alice");
    assert_eq!(to_bob[0].opponent_elo, 1200);
    assert_eq!(to_alice[0].game_id, to_bob[0].game_id);
}

#[test]
fn test_rating_gap_pushes_both_back() {
    let fx = fixture(&[("alice", 1200), ("carol", 2000)]);

    assert!(!fx.manager.match_pair(1, 2));

    assert_eq!(fx.manager.queue_len(), 2);
    assert!(fx.out.messages_of::<AutoMatchFound>(1).is_empty());
    assert!(fx.out.messages_of::<AutoMatchFound>(2).is_empty());
}

#[test]
fn test_game_starts_only_after_both_accept() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);

    assert!(fx.manager.match_pair(1, 2));
    let found: Vec<AutoMatchFound> = fx.out.messages_of(1);
    let game_id = found[0].game_id.clone();

    fx.manager.handle_accept(1, &game_id);
    assert!(fx.out.messages_of::<GameStart>(1).is_empty());
    assert!(fx.out.messages_of::<GameStart>(2).is_empty());

    fx.manager.handle_accept(2, &game_id);

    let to_alice: Vec<GameStart> = fx.out.messages_of(1);
    let to_bob: Vec<GameStart> = fx.out.messages_of(2);
    assert_eq!(to_alice.len(), 1);
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_alice[0], to_bob[0]);
    assert_eq!(to_alice[0].player1, "alice");
    assert_eq!(to_alice[0].player2, "bob");
    assert_eq!(to_alice[0].starting_player, "alice");
    assert_eq!(to_alice[0].fen, STARTPOS);
}

#[test]
fn test_decline_notifies_and_requeues_peer() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200), ("carol", 1200)]);

    assert!(fx.manager.match_pair(1, 2));
    let found: Vec<AutoMatchFound> = fx.out.messages_of(1);
    let game_id = found[0].game_id.clone();

    fx.manager.handle_decline(2, &game_id);

    let notices: Vec<MatchDeclinedNotification> = fx.out.messages_of(1);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].game_id, game_id);
    assert_eq!(fx.manager.queue_len(), 1);

    // Accepting the dead pairing goes nowhere.
    fx.manager.handle_accept(1, &game_id);
    assert!(fx.out.messages_of::<GameStart>(1).is_empty());

    // The requeued player pairs with the next arrival.
    assert!(fx.manager.match_pair(1, 3));
    let rematched: Vec<AutoMatchFound> = fx.out.messages_of(3);
    assert_eq!(rematched[0].opponent_username, "alice");
}

#[test]
fn test_move_fans_out_identical_updates() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    fx.manager.handle_move(1, &game_id, "e2e4");

    let to_alice = fx.out.payloads_of::<GameStatusUpdate>(1);
    let to_bob = fx.out.payloads_of::<GameStatusUpdate>(2);
    assert_eq!(to_alice.len(), 1);
    assert_eq!(to_alice, to_bob);

    let update = GameStatusUpdate::decode(&to_alice[0]).unwrap();
    assert_eq!(update.current_turn, "bob");
    assert!(!update.is_over);
    assert_eq!(update.note, "");
    assert!(update.fen.contains(" b "));

    assert!(fx.out.messages_of::<MoveError>(1).is_empty());
}

#[test]
fn test_wrong_turn_is_rejected_for_mover_only() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    fx.manager.handle_move(1, &game_id, "e2e4");
    fx.manager.handle_move(1, &game_id, "d2d4");

    let errors: Vec<MoveError> = fx.out.messages_of(1);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, "not_your_turn");
    assert!(fx.out.messages_of::<MoveError>(2).is_empty());

    // Only the first move produced updates.
    assert_eq!(fx.out.payloads_of::<GameStatusUpdate>(2).len(), 1);
}

#[test]
fn test_illegal_move_is_rejected_for_mover_only() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    fx.manager.handle_move(1, &game_id, "e2e4");
    fx.manager.handle_move(2, &game_id, "e2e4");

    let errors: Vec<MoveError> = fx.out.messages_of(2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, "illegal_move");
    assert!(fx.out.messages_of::<MoveError>(1).is_empty());
}

#[test]
fn test_unknown_game_is_reported() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);

    fx.manager.handle_move(1, "no_such_game", "e2e4");

    let errors: Vec<MoveError> = fx.out.messages_of(1);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, "game_not_found");
}

#[test]
fn test_outsider_cannot_move() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200), ("mallory", 1200)]);
    let game_id = start_game(&fx);

    fx.manager.handle_move(3, &game_id, "e2e4");

    let errors: Vec<MoveError> = fx.out.messages_of(3);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, "not_a_participant");
}

#[test]
fn test_checkmate_ends_game_and_moves_ratings() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    for (conn, uci) in &[(1, "f2f3"), (2, "e7e5"), (1, "g2g4"), (2, "d8h4")] {
        fx.manager.handle_move(*conn, &game_id, uci);
    }

    let updates: Vec<GameStatusUpdate> = fx.out.messages_of(1);
    assert_eq!(updates.len(), 4);
    assert!(updates[3].is_over);

    for conn in &[1, 2] {
        let ends: Vec<GameEnd> = fx.out.messages_of(*conn);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].winner, "bob");
        assert_eq!(ends[0].reason, "checkmate");
        assert_eq!(ends[0].half_move_count, 4);
    }

    // The table entry is gone.
    fx.manager.handle_move(2, &game_id, "e2e4");
    let errors: Vec<MoveError> = fx.out.messages_of(2);
    assert_eq!(errors[0].reason, "game_not_found");

    assert_eq!(fx.store.elo("bob"), Some(1216));
    assert_eq!(fx.store.elo("alice"), Some(1184));
}

#[test]
fn test_draw_leaves_ratings_alone() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    // Knight shuffle into threefold repetition.
    let shuffle = [
        (1, "g1f3"),
        (2, "g8f6"),
        (1, "f3g1"),
        (2, "f6g8"),
        (1, "g1f3"),
        (2, "g8f6"),
        (1, "f3g1"),
        (2, "f6g8"),
    ];
    for (conn, uci) in &shuffle {
        fx.manager.handle_move(*conn, &game_id, uci);
    }

    let ends: Vec<GameEnd> = fx.out.messages_of(1);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].winner, DRAW_WINNER);
    assert_eq!(ends[0].reason, "threefold repetition");

    assert_eq!(fx.store.elo("alice"), Some(1200));
    assert_eq!(fx.store.elo("bob"), Some(1200));
}

#[test]
fn test_disconnect_forfeits_active_game() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);
    let game_id = start_game(&fx);

    fx.manager.handle_move(1, &game_id, "e2e4");
    fx.manager.handle_disconnect(1);

    let ends: Vec<GameEnd> = fx.out.messages_of(2);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].game_id, game_id);
    assert_eq!(ends[0].winner, "bob");
    assert_eq!(ends[0].reason, "opponent_disconnected");
    assert_eq!(ends[0].half_move_count, 1);

    assert_eq!(fx.store.elo("bob"), Some(1216));
    assert_eq!(fx.store.elo("alice"), Some(1184));

    fx.manager.handle_move(2, &game_id, "e7e5");
    let errors: Vec<MoveError> = fx.out.messages_of(2);
    assert_eq!(errors[0].reason, "game_not_found");
}

#[test]
fn test_disconnect_cancels_pending_pairing() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);

    assert!(fx.manager.match_pair(1, 2));
    let found: Vec<AutoMatchFound> = fx.out.messages_of(1);
    let game_id = found[0].game_id.clone();

    fx.manager.handle_disconnect(2);

    let notices: Vec<MatchDeclinedNotification> = fx.out.messages_of(1);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].game_id, game_id);
    // The survivor is back in the queue.
    assert_eq!(fx.manager.queue_len(), 1);
}

#[test]
fn test_disconnect_leaves_the_queue() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);

    fx.manager.add_player(1);
    fx.manager.add_player(2);
    assert_eq!(fx.manager.queue_len(), 2);

    fx.manager.handle_disconnect(2);
    assert_eq!(fx.manager.queue_len(), 1);
}

#[test]
fn test_matcher_skips_vanished_entries() {
    let fx = fixture(&[("alice", 1200), ("bob", 1200)]);

    // Bob's binding disappears before the matcher gets to him.
    fx.out.drop_binding(2);

    assert!(!fx.manager.match_pair(1, 2));
    // Alice keeps her place at the head of the queue.
    assert_eq!(fx.manager.queue_len(), 1);
    assert!(fx.out.messages_of::<AutoMatchFound>(1).is_empty());
}
