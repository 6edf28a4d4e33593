pub mod bitboard;
pub mod board;
pub mod controller;
pub mod eval;
pub mod history;
pub mod logging;
pub mod movegen;
pub mod moves;
pub mod ordering;
pub mod params;
pub mod perft;
pub mod search;
pub mod see;
pub mod syzygy;
pub mod threads;
pub mod time;
pub mod tt;
pub mod uci;
pub mod zobrist;

use std::env;
use std::thread;

/// Build every process-wide read-only table. Safe to call more than once;
/// all initializers are idempotent.
pub fn init_globals() {
    zobrist::init_zobrist();
    bitboard::init_attack_tables();
    movegen::init_move_tables();
    eval::init_eval();
}

pub fn run_cli() {
    logging::init_logging();
    init_globals();

    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "perft" => {
                perft::run_perft_suite();
                return;
            }
            "bench" => {
                let board = board::Position::startpos();
                let mut ctrl =
                    controller::SearchController::new(16, 1).expect("bench hash allocation");
                ctrl.register_post_function(Some(Box::new(|stats| {
                    println!(
                        "depth {} score {} nodes {} nps {}",
                        stats.depth,
                        stats.score,
                        stats.nodes,
                        stats.nps()
                    );
                })));
                println!("Running benchmark: startpos depth 12");
                ctrl.find_best_move(
                    &board,
                    controller::SearchType::FixedDepth,
                    0,
                    0,
                    12,
                    false,
                    &[],
                    &[],
                );
                return;
            }
            _ => {}
        }
    }

    // Normal mode: UCI on a dedicated big-stack thread.
    let builder = thread::Builder::new()
        .name("uci_thread".into())
        .stack_size(32 * 1024 * 1024);

    let handler = builder
        .spawn(|| {
            uci::uci_loop();
        })
        .expect("spawn uci thread");

    handler.join().expect("join uci thread");
}
