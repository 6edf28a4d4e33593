use halcyon::board::{CastleRights, Position, WHITE, WK, WR};
use halcyon::controller::{SearchController, SearchType};
use halcyon::eval::{is_mate_score, MATE};
use halcyon::movegen::find_uci_move;

fn init() {
    halcyon::init_globals();
}

fn controller(threads: usize) -> SearchController {
    SearchController::new(16, threads).expect("hash allocation")
}

#[test]
fn castling_scenario_updates_everything() {
    init();
    let mut pos =
        Position::from_fen("r3k2r/ppp1pppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();

    // Both castlings must be generated and legal.
    let kingside = find_uci_move(&pos, "e1g1").expect("O-O available");
    let queenside = find_uci_move(&pos, "e1c1").expect("O-O-O available");
    assert!(pos.is_legal(kingside));
    assert!(pos.is_legal(queenside));

    pos.do_move(kingside);
    assert_eq!(pos.state.castle[WHITE], CastleRights::CastledKSide);
    assert_eq!(pos.piece_on(6), WK as u8);
    assert_eq!(pos.piece_on(5), WR as u8);
    assert_eq!(pos.state.hash, pos.compute_hash());
}

#[test]
fn queen_endgame_is_won_with_mate_pv() {
    init();
    let board = Position::from_fen("8/8/8/3k4/8/3K4/8/7Q w - - 0 1").unwrap();
    let mut ctrl = controller(1);
    let best =
        ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 10, false, &[], &[]);
    assert!(!best.is_null());
    let stats = ctrl.last_stats();
    assert!(stats.score >= MATE - 10, "score {}", stats.score);
    assert!(!stats.pv.is_empty());
}

#[test]
fn mate_score_encodes_distance() {
    init();
    // Mate in 3 plies (two white moves): scores must be exact to a ply.
    let board = Position::from_fen("6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
    let mut ctrl = controller(1);
    ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 6, false, &[], &[]);
    let stats = ctrl.last_stats();
    assert!(is_mate_score(stats.score));
    assert_eq!(stats.score, MATE - 1);
}

#[test]
fn search_is_deterministic_after_clearing() {
    init();
    let board = Position::from_fen(
        "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
    )
    .unwrap();
    let mut ctrl = controller(1);

    ctrl.clear_hash_tables();
    let a = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 8, false, &[], &[]);
    let a_score = ctrl.last_stats().score;

    ctrl.clear_hash_tables();
    let b = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 8, false, &[], &[]);
    let b_score = ctrl.last_stats().score;

    assert_eq!(a, b);
    assert_eq!(a_score, b_score);
}

#[test]
fn two_workers_match_one_worker_when_the_best_move_is_forced() {
    init();
    // Shared-table searches are not move-for-move deterministic, so the
    // agreement check uses a position whose best move is unique.
    let board = Position::from_fen("6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1").unwrap();

    let mut single = controller(1);
    let a = single.find_best_move(&board, SearchType::FixedDepth, 0, 0, 10, false, &[], &[]);

    let mut multi = controller(2);
    let b = multi.find_best_move(&board, SearchType::FixedDepth, 0, 0, 10, false, &[], &[]);

    assert_eq!(a.to_uci(), "a1a8");
    assert_eq!(a.to_uci(), b.to_uci());
    assert_eq!(multi.last_stats().score, MATE - 1);
}

#[test]
fn fen_round_trip_laws() {
    init();
    let fens = [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "rnbq1rk1/pppp1ppp/4pn2/8/1bPP4/2N2N2/PP2PPPP/R1BQKB1R w KQ - 2 5",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        "4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2",
    ];
    for fen in fens {
        let pos = Position::from_fen(fen).unwrap();
        let emitted = pos.to_fen();
        let reparsed = Position::from_fen(&emitted).unwrap();
        assert_eq!(reparsed.to_fen(), emitted, "round trip for {}", fen);
    }
}

#[test]
fn time_limited_search_respects_the_clock() {
    init();
    let board = Position::startpos();
    let mut ctrl = controller(1);
    let start = std::time::Instant::now();
    let mv = ctrl.find_best_move(&board, SearchType::FixedTime, 300, 0, 0, false, &[], &[]);
    let elapsed = start.elapsed().as_millis();
    assert!(!mv.is_null());
    // Generous envelope: the soft limit is 300ms, the hard stop well under 3s.
    assert!(elapsed < 3000, "search ran {}ms", elapsed);
}

#[test]
fn bare_kings_score_draw_immediately() {
    init();
    let board = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
    assert!(board.material_draw());
    let mut ctrl = controller(1);
    ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 6, false, &[], &[]);
    assert_eq!(ctrl.last_stats().score, 0);
}
