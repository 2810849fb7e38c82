use crate::game::*;

fn start_game() -> Game {
    Game::new(
        "game_alice_bob_20250101120000_0".to_owned(),
        "alice".to_owned(),
        "bob".to_owned(),
        STARTPOS,
    )
    .unwrap()
}

#[test]
fn test_new_game_starts_with_white() {
    let game = start_game();

    assert_eq!(game.current_turn(), "alice");
    assert_eq!(game.half_moves(), 0);
    assert_eq!(game.fen(), STARTPOS);
    assert!(!game.is_over());
    assert_eq!(game.winner(), "");
}

#[test]
fn test_side_to_move_comes_from_fen() {
    let game = Game::new(
        "g".to_owned(),
        "alice".to_owned(),
        "bob".to_owned(),
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
    )
    .unwrap();

    assert_eq!(game.current_turn(), "bob");
}

#[test]
fn test_invalid_fen_is_rejected() {
    assert!(Game::new(
        "g".to_owned(),
        "alice".to_owned(),
        "bob".to_owned(),
        "not a position"
    )
    .is_err());
}

#[test]
fn test_legal_move_toggles_turn() {
    let mut game = start_game();

    assert!(game.try_move("e2e4"));
    assert_eq!(game.current_turn(), "bob");
    assert_eq!(game.half_moves(), 1);
    assert!(!game.is_over());

    assert!(game.try_move("e7e5"));
    assert_eq!(game.current_turn(), "alice");
    assert_eq!(game.half_moves(), 2);
}

#[test]
fn test_illegal_move_leaves_state_untouched() {
    let mut game = start_game();
    let fen_before = game.fen();

    // A pawn cannot jump three ranks.
    assert!(!game.try_move("e2e5"));
    // Nonsense input.
    assert!(!game.try_move("zz9x"));
    // Black piece while it is white's turn.
    assert!(!game.try_move("e7e5"));

    assert_eq!(game.fen(), fen_before);
    assert_eq!(game.current_turn(), "alice");
    assert_eq!(game.half_moves(), 0);
}

#[test]
fn test_check_is_flagged() {
    let mut game = start_game();

    assert!(game.try_move("e2e4"));
    assert!(!game.is_in_check());
    assert!(game.try_move("f7f6"));
    assert!(game.try_move("d1h5"));

    assert!(game.is_in_check());
    assert!(!game.is_over());
    assert_eq!(game.current_turn(), "bob");
}

#[test]
fn test_fools_mate_is_checkmate() {
    let mut game = start_game();

    for uci in &["f2f3", "e7e5", "g2g4", "d8h4"] {
        assert!(game.try_move(uci));
    }

    assert!(game.is_over());
    assert_eq!(game.winner(), "bob");
    assert_eq!(game.end_reason(), Some(EndReason::Checkmate));
    assert_eq!(game.end_result(), Some(EndResult::Lose));
    assert_eq!(game.half_moves(), 4);
    // The mated side stays on turn; no toggle after termination.
    assert_eq!(game.current_turn(), "bob");

    // No more moves once the game is over.
    assert!(!game.try_move("e2e4"));
}

#[test]
fn test_stalemate_is_a_draw() {
    let mut game = Game::new(
        "g".to_owned(),
        "alice".to_owned(),
        "bob".to_owned(),
        "7k/8/4Q3/8/8/8/8/K7 w - - 0 1",
    )
    .unwrap();

    assert!(game.try_move("e6g6"));

    assert!(game.is_over());
    assert_eq!(game.winner(), DRAW_WINNER);
    assert_eq!(game.end_reason(), Some(EndReason::Stalemate));
    assert_eq!(game.end_result(), Some(EndResult::Draw));
}

#[test]
fn test_fifty_move_rule_fires_at_hundred_plies() {
    let mut game = Game::new(
        "g".to_owned(),
        "alice".to_owned(),
        "bob".to_owned(),
        "8/8/8/4k3/8/4K3/8/7R w - - 99 80",
    )
    .unwrap();

    assert!(game.try_move("h1h2"));

    assert!(game.is_over());
    assert_eq!(game.winner(), DRAW_WINNER);
    assert_eq!(game.end_reason(), Some(EndReason::FiftyMoveRule));
}

#[test]
fn test_threefold_repetition_is_detected() {
    let mut game = start_game();

    // Knight shuffles: the starting position recurs after every fourth
    // ply, for the third time on ply eight.
    let shuffle = [
        "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
    ];
    for (index, uci) in shuffle.iter().enumerate() {
        assert!(game.try_move(uci));
        if index < shuffle.len() - 1 {
            assert!(!game.is_over());
        }
    }

    assert!(game.is_over());
    assert_eq!(game.winner(), DRAW_WINNER);
    assert_eq!(game.end_reason(), Some(EndReason::ThreefoldRepetition));
}

#[test]
fn test_forfeit_awards_the_opponent() {
    let mut game = start_game();
    assert!(game.try_move("e2e4"));

    game.forfeit("alice");

    assert!(game.is_over());
    assert_eq!(game.winner(), "bob");
    assert_eq!(game.end_reason(), Some(EndReason::Forfeit));
    assert_eq!(game.end_reason().unwrap().as_str(), "opponent_disconnected");
}
