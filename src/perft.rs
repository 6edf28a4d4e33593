use crate::movegen::MoveGenerator;
use crate::board::Position;
use std::time::Instant;

pub fn run_perft_suite() {
    println!("--- Halcyon Perft Suite ---");

    let positions = [
        (
            "Start Position",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            [1u64, 20, 400, 8902, 197281, 4865609],
        ),
        (
            "Position 2 (Kiwipete)",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            [1, 48, 2039, 97862, 4085603, 193690690],
        ),
        (
            "Position 3",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            [1, 14, 191, 2812, 43238, 674624],
        ),
        (
            "Position 4",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            [1, 6, 264, 9467, 422333, 15833292],
        ),
        (
            "Position 5",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            [1, 44, 1486, 62379, 2103487, 89941194],
        ),
    ];

    let mut total_nodes = 0u64;
    let mut total_time = 0u128;

    for (name, fen, expected) in positions.iter() {
        println!("\nTesting: {}", name);
        let mut pos = Position::from_fen(fen).expect("suite FEN");

        // Depth 4 keeps the suite quick; depth 5 references stay in the
        // table for manual runs.
        let depth = 4.min(expected.len() - 1);

        let start = Instant::now();
        let nodes = perft(&mut pos, depth as u32);
        let elapsed = start.elapsed().as_millis();

        total_nodes += nodes;
        total_time += elapsed;

        println!("Depth {}: Nodes: {} Time: {}ms", depth, nodes, elapsed);

        if nodes == expected[depth] {
            println!("RESULT: PASS");
        } else {
            println!("RESULT: FAIL (Expected {})", expected[depth]);
            perft_divide(&mut pos, depth as u32);
        }
    }

    println!("\n--- SUITE COMPLETE ---");
    println!("Total Nodes: {}", total_nodes);
    println!("Total Time:  {}ms", total_time);
    if total_time > 0 {
        println!("NPS:         {}", (total_nodes as u128 * 1000) / total_time);
    }
}

/// Legal-move node count to `depth`, by make/unmake.
pub fn perft(pos: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut gen = MoveGenerator::new();
    gen.generate_all(pos);

    let mut nodes = 0;
    for i in 0..gen.list.count {
        let mv = gen.list.moves[i];
        if !pos.is_legal(mv) {
            continue;
        }
        if depth == 1 {
            nodes += 1;
            continue;
        }
        let saved = pos.do_move(mv);
        nodes += perft(pos, depth - 1);
        pos.undo_move(mv, saved);
    }
    nodes
}

/// Per-root-move breakdown, for hunting generation bugs.
pub fn perft_divide(pos: &mut Position, depth: u32) {
    println!("--- Perft Divide Depth {} ---", depth);
    let mut gen = MoveGenerator::new();
    gen.generate_all(pos);

    let mut total = 0;
    for i in 0..gen.list.count {
        let mv = gen.list.moves[i];
        if !pos.is_legal(mv) {
            continue;
        }
        let saved = pos.do_move(mv);
        let count = perft(pos, depth - 1);
        pos.undo_move(mv, saved);
        println!("{}: {}", mv.to_uci(), count);
        total += count;
    }
    println!("Total: {}", total);
}
