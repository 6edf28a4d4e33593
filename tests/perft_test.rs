use halcyon::board::Position;
use halcyon::perft::perft;

fn init() {
    halcyon::init_globals();
}

#[test]
fn startpos_perft_5() {
    init();
    let mut pos = Position::startpos();
    assert_eq!(perft(&mut pos, 5), 4_865_609);
}

#[test]
fn kiwipete_perft_4() {
    init();
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    assert_eq!(perft(&mut pos, 4), 4_085_603);
}

#[test]
fn position_4_perft_4() {
    init();
    let mut pos = Position::from_fen(
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    )
    .unwrap();
    assert_eq!(perft(&mut pos, 4), 422_333);
}

#[test]
fn position_5_perft_4() {
    init();
    let mut pos = Position::from_fen(
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    )
    .unwrap();
    assert_eq!(perft(&mut pos, 4), 2_103_487);
}
