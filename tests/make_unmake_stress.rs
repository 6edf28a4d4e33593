use halcyon::board::Position;
use halcyon::movegen::MoveGenerator;
use rand::Rng;

/// Random-walk stress: every make/unmake pair must restore the position
/// bit-identically, and the incremental hash must always match a scratch
/// recomputation.
#[test]
fn make_unmake_random_walk() {
    halcyon::init_globals();

    let mut pos = Position::startpos();
    let mut rng = rand::rng();

    for _ in 0..20_000 {
        let mut gen = MoveGenerator::new();
        gen.generate_all(&pos);

        let mut legal = Vec::with_capacity(gen.list.count);
        for i in 0..gen.list.count {
            let mv = gen.list.moves[i];
            if pos.is_legal(mv) {
                legal.push(mv);
            }
        }

        if legal.is_empty() || pos.is_fifty_move_draw() {
            pos = Position::startpos();
            continue;
        }

        let mv = legal[rng.random_range(0..legal.len())];

        let before = pos.clone();
        let saved = pos.do_move(mv);

        assert_eq!(
            pos.state.hash,
            pos.compute_hash(),
            "incremental hash diverged after {:?}",
            mv
        );
        assert_eq!(pos.all_occupied, pos.occupied[0] | pos.occupied[1]);

        let mut undone = pos.clone();
        undone.undo_move(mv, saved);
        assert_eq!(undone, before, "unmake failed to restore {:?}", mv);
    }
}

#[test]
fn hash_after_agrees_with_do_move_on_walk() {
    halcyon::init_globals();

    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    let mut rng = rand::rng();

    for _ in 0..2_000 {
        let mut gen = MoveGenerator::new();
        gen.generate_all(&pos);

        let mut legal = Vec::new();
        for i in 0..gen.list.count {
            let mv = gen.list.moves[i];
            if pos.is_legal(mv) {
                legal.push(mv);
            }
        }
        if legal.is_empty() || pos.is_fifty_move_draw() {
            break;
        }

        let mv = legal[rng.random_range(0..legal.len())];
        let predicted = pos.hash_after(mv);
        pos.do_move(mv);
        assert_eq!(predicted, pos.state.hash, "hash_after mismatch on {:?}", mv);
    }
}
