use crate::bitboard::{self, Bitboard};
use crate::board::{
    type_of, Position, BLACK, BB, BK, BN, BP, BQ, BR, NO_PIECE, WB, WHITE, WK, WN, WP, WQ, WR,
};
use crate::eval::TB_WIN;
use crate::moves::{Move, MoveKind, PT_BISHOP, PT_KNIGHT, PT_NONE, PT_PAWN, PT_QUEEN, PT_ROOK};
use pyrrhic_rs::{EngineAdapter, TableBases};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone)]
pub struct HalcyonAdapter;

impl EngineAdapter for HalcyonAdapter {
    fn pawn_attacks(side: pyrrhic_rs::Color, pawns: u64) -> u64 {
        let s = match side {
            pyrrhic_rs::Color::White => WHITE,
            pyrrhic_rs::Color::Black => BLACK,
        };
        bitboard::pawn_attacks(Bitboard(pawns), s).0
    }
    fn knight_attacks(squares: u64) -> u64 {
        let mut attacks = 0;
        let mut bb = Bitboard(squares);
        while let Some(sq) = bb.next_square() {
            attacks |= bitboard::mask_knight_attacks(sq).0;
        }
        attacks
    }
    fn bishop_attacks(squares: u64, occ: u64) -> u64 {
        let mut attacks = 0;
        let mut bb = Bitboard(squares);
        while let Some(sq) = bb.next_square() {
            attacks |= bitboard::get_bishop_attacks(sq, Bitboard(occ)).0;
        }
        attacks
    }
    fn rook_attacks(squares: u64, occ: u64) -> u64 {
        let mut attacks = 0;
        let mut bb = Bitboard(squares);
        while let Some(sq) = bb.next_square() {
            attacks |= bitboard::get_rook_attacks(sq, Bitboard(occ)).0;
        }
        attacks
    }
    fn queen_attacks(squares: u64, occ: u64) -> u64 {
        let mut attacks = 0;
        let mut bb = Bitboard(squares);
        while let Some(sq) = bb.next_square() {
            attacks |= bitboard::get_queen_attacks(sq, Bitboard(occ)).0;
        }
        attacks
    }
    fn king_attacks(squares: u64) -> u64 {
        let mut attacks = 0;
        let mut bb = Bitboard(squares);
        while let Some(sq) = bb.next_square() {
            attacks |= bitboard::mask_king_attacks(sq).0;
        }
        attacks
    }
}

pub static TABLEBASE: Mutex<Option<TableBases<HalcyonAdapter>>> = Mutex::new(None);
pub static TB_ENABLED: AtomicBool = AtomicBool::new(false);
static TB_MAX_MEN: AtomicUsize = AtomicUsize::new(6);

pub fn init_tablebase(path: &str) {
    if path.is_empty() {
        return;
    }
    match TableBases::<HalcyonAdapter>::new(path) {
        Ok(tb) => {
            let mut lock = TABLEBASE.lock().unwrap();
            *lock = Some(tb);
            TB_ENABLED.store(true, Ordering::SeqCst);
            log::info!("syzygy tablebases loaded from {}", path);
        }
        Err(e) => log::warn!("syzygy init failed: {:?}", e),
    }
}

/// Probe gate: tables present, few enough men, castling gone, and a fresh
/// halfmove clock (table results assume no 50-move history).
pub fn usable(pos: &Position) -> bool {
    TB_ENABLED.load(Ordering::Relaxed)
        && pos.all_occupied.count() <= TB_MAX_MEN.load(Ordering::Relaxed)
        && pos.state.halfmove_clock == 0
        && !pos.state.castle[WHITE].can_kside()
        && !pos.state.castle[WHITE].can_qside()
        && !pos.state.castle[BLACK].can_kside()
        && !pos.state.castle[BLACK].can_qside()
}

fn piece_sets(pos: &Position) -> (u64, u64, u64, u64, u64, u64, u64, u64) {
    (
        pos.occupied[WHITE].0,
        pos.occupied[BLACK].0,
        pos.bitboards[WK].0 | pos.bitboards[BK].0,
        pos.bitboards[WQ].0 | pos.bitboards[BQ].0,
        pos.bitboards[WR].0 | pos.bitboards[BR].0,
        pos.bitboards[WB].0 | pos.bitboards[BB].0,
        pos.bitboards[WN].0 | pos.bitboards[BN].0,
        pos.bitboards[WP].0 | pos.bitboards[BP].0,
    )
}

/// WDL probe inside the tree. A probe miss is not an error; the search
/// simply continues. Wins are reported just below the mate range, pushed
/// towards the root so nearer conversions score higher.
pub fn probe_wdl(pos: &Position, ply: usize) -> Option<i32> {
    if !TB_ENABLED.load(Ordering::Relaxed) {
        return None;
    }
    let (white, black, kings, queens, rooks, bishops, knights, pawns) = piece_sets(pos);
    let turn = pos.side == WHITE;

    let lock = TABLEBASE.lock().unwrap();
    let tb = lock.as_ref()?;
    let wdl = tb
        .probe_wdl(
            white,
            black,
            kings,
            queens,
            rooks,
            bishops,
            knights,
            pawns,
            0,
            turn,
        )
        .ok()?;
    use pyrrhic_rs::WdlProbeResult;
    Some(match wdl {
        WdlProbeResult::Win => TB_WIN - ply as i32,
        WdlProbeResult::Loss => -TB_WIN + ply as i32,
        WdlProbeResult::Draw | WdlProbeResult::BlessedLoss | WdlProbeResult::CursedWin => 0,
    })
}

/// Root probe: returns the tablebase-best move with its score, or None
/// when no table covers the position.
pub fn probe_root(pos: &Position) -> Option<(Move, i32)> {
    if !usable(pos) {
        return None;
    }
    let (white, black, kings, queens, rooks, bishops, knights, pawns) = piece_sets(pos);
    let ep = if pos.state.ep_square != crate::board::INVALID_SQUARE {
        pos.state.ep_square as u32
    } else {
        0
    };
    let turn = pos.side == WHITE;

    let lock = TABLEBASE.lock().unwrap();
    let tb = lock.as_ref()?;
    let res = tb
        .probe_root(
            white,
            black,
            kings,
            queens,
            rooks,
            bishops,
            knights,
            pawns,
            pos.state.halfmove_clock as u32,
            ep,
            turn,
        )
        .ok()?;

    use pyrrhic_rs::{DtzProbeValue, Piece, WdlProbeResult};
    match res.root {
        DtzProbeValue::Checkmate | DtzProbeValue::Stalemate | DtzProbeValue::Failed => None,
        DtzProbeValue::DtzResult(dtz) => {
            let from = dtz.from_square;
            let to = dtz.to_square;
            let piece = pos.piece_on(from);
            if piece == NO_PIECE {
                return None;
            }
            let pt = type_of(piece);
            let promo = match dtz.promotion {
                Piece::Queen => PT_QUEEN,
                Piece::Rook => PT_ROOK,
                Piece::Bishop => PT_BISHOP,
                Piece::Knight => PT_KNIGHT,
                _ => PT_NONE,
            };
            let target = pos.piece_on(to);
            let capture = if target == NO_PIECE {
                PT_NONE
            } else {
                type_of(target)
            };
            let kind = if dtz.ep {
                MoveKind::EnPassant
            } else if promo != PT_NONE {
                MoveKind::Promotion
            } else {
                MoveKind::Normal
            };
            let mv = Move::new(from, to, pt, capture, promo, kind);

            let score = match dtz.wdl {
                WdlProbeResult::Win => TB_WIN,
                WdlProbeResult::Loss => -TB_WIN,
                _ => 0,
            };
            Some((mv, score))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;

    fn init() {
        crate::zobrist::init_zobrist();
        crate::bitboard::init_attack_tables();
        crate::movegen::init_move_tables();
    }

    #[test]
    fn probes_without_tables_are_misses() {
        init();
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(probe_wdl(&pos, 0).is_none());
        assert!(probe_root(&pos).is_none());
    }

    #[test]
    fn gate_respects_castling_and_clock() {
        init();
        // Even if tables were loaded, these positions must not be probed.
        let castled =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert!(!usable(&castled));
        let clock = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 7 12").unwrap();
        assert!(!usable(&clock));
    }
}
