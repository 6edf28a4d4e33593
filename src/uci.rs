use crate::board::Position;
use crate::controller::SearchController;
use crate::eval::{MATE, MATE_RANGE};
use crate::movegen;
use crate::search::{Limits, Statistics};
use crate::time::{TimeControl, TimeManager};
use std::io::{self, BufRead};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;

const DEFAULT_HASH_MB: usize = 64;

fn format_score(score: i32) -> String {
    if score > MATE_RANGE {
        format!("mate {}", (MATE - score + 1) / 2)
    } else if score < -MATE_RANGE {
        format!("mate -{}", (MATE + score + 1) / 2)
    } else {
        format!("cp {}", score)
    }
}

fn print_info(stats: &Statistics) {
    let mut pv = String::new();
    for mv in &stats.pv {
        pv.push_str(&mv.to_uci());
        pv.push(' ');
    }
    println!(
        "info depth {} seldepth {} score {} nodes {} nps {} tbhits {} time {} pv {}",
        stats.depth,
        stats.seldepth,
        format_score(stats.score),
        stats.nodes,
        stats.nps(),
        stats.tb_hits,
        stats.elapsed_ms,
        pv.trim_end()
    );
}

pub fn uci_loop() {
    let stdin = io::stdin();
    let mut buffer = String::new();

    let controller = Arc::new(Mutex::new(
        SearchController::new(DEFAULT_HASH_MB, 1).expect("default hash allocation"),
    ));
    {
        let ctrl = controller.lock().unwrap();
        ctrl.register_post_function(Some(Box::new(print_info)));
    }
    let stop = controller.lock().unwrap().stop_handle();
    let background = controller.lock().unwrap().background_handle();

    let mut position = Position::startpos();
    let mut move_overhead: u64 = 10;
    let mut search_thread: Option<thread::JoinHandle<()>> = None;

    loop {
        buffer.clear();
        match stdin.lock().read_line(&mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let cmd = buffer.trim();
        if cmd.is_empty() {
            continue;
        }
        let parts: Vec<&str> = cmd.split_whitespace().collect();

        match parts[0] {
            "uci" => {
                println!("id name Halcyon");
                println!("id author the Halcyon authors");
                println!("option name Hash type spin default 64 min 1 max 4096");
                println!("option name Threads type spin default 1 min 1 max 64");
                println!("option name Contempt type spin default 0 min -200 max 200");
                println!("option name MoveOverhead type spin default 10 min 0 max 1000");
                println!("option name SyzygyPath type string default <empty>");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                position = Position::startpos();
                controller.lock().unwrap().clear_hash_tables();
            }
            "position" => {
                handle_position(&mut position, &parts);
            }
            "go" => {
                stop.store(true, Ordering::SeqCst);
                if let Some(h) = search_thread.take() {
                    let _ = h.join();
                }

                let (limits, ponder) = parse_go(&position, &parts, move_overhead);
                let ctrl = Arc::clone(&controller);
                let pos = position.clone();
                search_thread = Some(thread::spawn(move || {
                    let mut guard = ctrl.lock().unwrap();
                    let best = guard.search_with_limits(&pos, limits, ponder, &[], &[]);
                    let ponder_move = guard.last_stats().ponder_move;
                    drop(guard);
                    if ponder_move.is_null() {
                        println!("bestmove {}", best.to_uci());
                    } else {
                        println!("bestmove {} ponder {}", best.to_uci(), ponder_move.to_uci());
                    }
                }));
            }
            "ponderhit" => {
                background.store(false, Ordering::SeqCst);
            }
            "stop" => {
                background.store(false, Ordering::SeqCst);
                stop.store(true, Ordering::SeqCst);
                if let Some(h) = search_thread.take() {
                    let _ = h.join();
                }
            }
            "setoption" => {
                handle_setoption(&controller, &parts, &mut move_overhead);
            }
            "perft" => {
                let depth = parts.get(1).and_then(|d| d.parse().ok()).unwrap_or(5);
                crate::perft::perft_divide(&mut position, depth);
            }
            "quit" => {
                stop.store(true, Ordering::SeqCst);
                if let Some(h) = search_thread.take() {
                    let _ = h.join();
                }
                break;
            }
            _ => {}
        }
    }
}

fn handle_position(position: &mut Position, parts: &[&str]) {
    if parts.len() < 2 {
        return;
    }
    let mut move_index = 0;

    if parts[1] == "startpos" {
        *position = Position::startpos();
        if parts.len() > 2 && parts[2] == "moves" {
            move_index = 3;
        }
    } else if parts[1] == "fen" {
        let mut fen = String::new();
        let mut i = 2;
        while i < parts.len() && parts[i] != "moves" {
            fen.push_str(parts[i]);
            fen.push(' ');
            i += 1;
        }
        match Position::from_fen(fen.trim()) {
            Ok(pos) => *position = pos,
            Err(e) => {
                log::warn!("rejected FEN '{}': {}", fen.trim(), e);
                return;
            }
        }
        if i < parts.len() && parts[i] == "moves" {
            move_index = i + 1;
        }
    }

    if move_index > 0 {
        for text in &parts[move_index..] {
            let mv = movegen::find_uci_move(position, text);
            match mv {
                Some(mv) => {
                    if !position.is_legal(mv) {
                        log::warn!("illegal move '{}' in position command", text);
                        break;
                    }
                    position.do_move(mv);
                }
                None => {
                    log::warn!("unparseable move '{}' in position command", text);
                    break;
                }
            }
        }
    }
}

fn parse_go(position: &Position, parts: &[&str], overhead: u64) -> (Limits, bool) {
    let mut depth: Option<i32> = None;
    let mut nodes: Option<u64> = None;
    let mut movetime: Option<u64> = None;
    let mut wtime: Option<u64> = None;
    let mut btime: Option<u64> = None;
    let mut winc: Option<u64> = None;
    let mut binc: Option<u64> = None;
    let mut movestogo: Option<u32> = None;
    let mut infinite = false;
    let mut ponder = false;

    let mut i = 1;
    while i < parts.len() {
        match parts[i] {
            "depth" => {
                depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "nodes" => {
                nodes = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "movetime" => {
                movetime = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "wtime" => {
                wtime = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "btime" => {
                btime = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "winc" => {
                winc = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "binc" => {
                binc = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "movestogo" => {
                movestogo = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "infinite" => infinite = true,
            "ponder" => ponder = true,
            _ => {}
        }
        i += 1;
    }

    let limits = if infinite {
        Limits::Infinite
    } else if let Some(d) = depth {
        Limits::FixedDepth(d)
    } else if let Some(n) = nodes {
        Limits::FixedNodes(n)
    } else if let Some(mt) = movetime {
        Limits::Time(TimeManager::new(TimeControl::MoveTime(mt), position.side, overhead))
    } else if wtime.is_some() || btime.is_some() {
        let tc = TimeControl::GameTime {
            wtime: wtime.unwrap_or(0),
            btime: btime.unwrap_or(0),
            winc: winc.unwrap_or(0),
            binc: binc.unwrap_or(0),
            moves_to_go: movestogo,
        };
        Limits::Time(TimeManager::new(tc, position.side, overhead))
    } else {
        Limits::Infinite
    };

    (limits, ponder)
}

fn handle_setoption(
    controller: &Arc<Mutex<SearchController>>,
    parts: &[&str],
    move_overhead: &mut u64,
) {
    // setoption name <Name> value <Value>
    let Some(name_at) = parts.iter().position(|&p| p == "name") else {
        return;
    };
    let Some(value_at) = parts.iter().position(|&p| p == "value") else {
        return;
    };
    if value_at <= name_at + 1 {
        return;
    }
    let name = parts[name_at + 1..value_at].join(" ");
    let value = parts[value_at + 1..].join(" ");

    match name.as_str() {
        "Hash" => {
            if let Ok(mb) = value.parse::<usize>() {
                if let Err(e) = controller.lock().unwrap().resize_hash(mb) {
                    log::warn!("hash resize failed: {}", e);
                }
            }
        }
        "Threads" => {
            if let Ok(n) = value.parse::<usize>() {
                controller.lock().unwrap().set_thread_count(n.clamp(1, 64));
            }
        }
        "Contempt" => {
            if let Ok(c) = value.parse::<i32>() {
                controller.lock().unwrap().set_contempt(c.clamp(-200, 200));
            }
        }
        "MoveOverhead" => {
            if let Ok(ms) = value.parse::<u64>() {
                *move_overhead = ms.min(1000);
            }
        }
        "SyzygyPath" => {
            if value != "<empty>" {
                crate::syzygy::init_tablebase(&value);
            }
        }
        _ => {}
    }
}
