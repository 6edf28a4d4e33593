use crate::moves::Move;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

// Shared across all search workers. Updates use relaxed atomics; a lost
// update now and then is acceptable for ordering heuristics.

const MAX_HISTORY_DEPTH: i32 = 17;
const MAIN_HISTORY_DIVISOR: i32 = 324;
const CONT_HISTORY_DIVISOR: i32 = 768;

// Butterfly: [side][from][to]
const BUTTERFLY_SIZE: usize = 2 * 64 * 64;
// Counter moves: [piece][to] (piece includes color, 0..11)
const COUNTER_SIZE: usize = 12 * 64;
// Counter-move / follow-up history: [ptype][to][ptype][to]
const CONT_DIM: usize = 6 * 64;
const CONT_SIZE: usize = CONT_DIM * CONT_DIM;

pub struct HistoryTables {
    butterfly: Vec<AtomicI32>,
    counters: Vec<AtomicU32>,
    cm_history: Vec<AtomicI32>,
    fu_history: Vec<AtomicI32>,
}

#[inline(always)]
fn atomic_zeroes_i32(len: usize) -> Vec<AtomicI32> {
    let mut v = Vec::with_capacity(len);
    v.resize_with(len, || AtomicI32::new(0));
    v
}

impl HistoryTables {
    pub fn new() -> Self {
        let mut counters = Vec::with_capacity(COUNTER_SIZE);
        counters.resize_with(COUNTER_SIZE, || AtomicU32::new(0));
        Self {
            butterfly: atomic_zeroes_i32(BUTTERFLY_SIZE),
            counters,
            cm_history: atomic_zeroes_i32(CONT_SIZE),
            fu_history: atomic_zeroes_i32(CONT_SIZE),
        }
    }

    pub fn clear(&self) {
        for v in &self.butterfly {
            v.store(0, Ordering::Relaxed);
        }
        for v in &self.counters {
            v.store(0, Ordering::Relaxed);
        }
        for v in &self.cm_history {
            v.store(0, Ordering::Relaxed);
        }
        for v in &self.fu_history {
            v.store(0, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    fn butterfly_idx(side: usize, from: u8, to: u8) -> usize {
        (side * 64 + from as usize) * 64 + to as usize
    }

    #[inline(always)]
    fn cont_idx(prev_pt: u8, prev_to: u8, pt: u8, to: u8) -> usize {
        (prev_pt as usize * 64 + prev_to as usize) * CONT_DIM + (pt as usize * 64 + to as usize)
    }

    /// Damped history update: v += 32*bonus - v*|bonus|/divisor. Saturates
    /// well below i32 range, so the tables never need clamping.
    #[inline(always)]
    fn damped_update(entry: &AtomicI32, bonus: i32, divisor: i32) {
        let v = entry.load(Ordering::Relaxed);
        entry.store(v + 32 * bonus - v * bonus.abs() / divisor, Ordering::Relaxed);
    }

    /// History bonus for a cutoff found at `depth`: d^2 + 2d, zero beyond
    /// the damping horizon.
    #[inline(always)]
    pub fn bonus(depth: i32) -> i32 {
        if depth <= MAX_HISTORY_DEPTH {
            depth * depth + 2 * depth
        } else {
            0
        }
    }

    #[inline(always)]
    pub fn history_score(&self, side: usize, mv: Move) -> i32 {
        self.butterfly[Self::butterfly_idx(side, mv.start(), mv.dest())].load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn cm_score(&self, prev: Move, mv: Move) -> i32 {
        if prev.is_null() {
            return 0;
        }
        self.cm_history[Self::cont_idx(
            prev.piece_moved(),
            prev.dest(),
            mv.piece_moved(),
            mv.dest(),
        )]
        .load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn fu_score(&self, prev2: Move, mv: Move) -> i32 {
        if prev2.is_null() {
            return 0;
        }
        self.fu_history[Self::cont_idx(
            prev2.piece_moved(),
            prev2.dest(),
            mv.piece_moved(),
            mv.dest(),
        )]
        .load(Ordering::Relaxed)
    }

    /// Combined ordering score for a quiet move.
    #[inline(always)]
    pub fn ordering_score(&self, side: usize, mv: Move, prev: Move, prev2: Move) -> i32 {
        self.history_score(side, mv) + self.cm_score(prev, mv) + self.fu_score(prev2, mv)
    }

    #[inline(always)]
    pub fn counter_move(&self, prev_piece: usize, prev_to: u8) -> Move {
        Move(self.counters[prev_piece * 64 + prev_to as usize].load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn set_counter_move(&self, prev_piece: usize, prev_to: u8, mv: Move) {
        self.counters[prev_piece * 64 + prev_to as usize].store(mv.0, Ordering::Relaxed);
    }

    /// Reward the cutoff move and penalize every quiet tried before it, in
    /// the butterfly table and both continuation tables.
    pub fn update_stats(
        &self,
        side: usize,
        best: Move,
        quiets: &[Move],
        depth: i32,
        prev: Move,
        prev2: Move,
    ) {
        let b = Self::bonus(depth);
        if b == 0 {
            return;
        }
        for &m in quiets {
            let signed = if m == best { b } else { -b };
            Self::damped_update(
                &self.butterfly[Self::butterfly_idx(side, m.start(), m.dest())],
                signed,
                MAIN_HISTORY_DIVISOR,
            );
            if !prev.is_null() {
                Self::damped_update(
                    &self.cm_history
                        [Self::cont_idx(prev.piece_moved(), prev.dest(), m.piece_moved(), m.dest())],
                    signed,
                    CONT_HISTORY_DIVISOR,
                );
            }
            if !prev2.is_null() {
                Self::damped_update(
                    &self.fu_history
                        [Self::cont_idx(prev2.piece_moved(), prev2.dest(), m.piece_moved(), m.dest())],
                    signed,
                    CONT_HISTORY_DIVISOR,
                );
            }
        }
    }
}

impl Default for HistoryTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::{Move, PT_KNIGHT, PT_NONE, PT_PAWN};

    #[test]
    fn bonus_shape() {
        assert_eq!(HistoryTables::bonus(1), 3);
        assert_eq!(HistoryTables::bonus(4), 24);
        assert_eq!(HistoryTables::bonus(17), 17 * 17 + 34);
        assert_eq!(HistoryTables::bonus(18), 0);
    }

    #[test]
    fn cutoff_move_gains_others_lose() {
        let tables = HistoryTables::new();
        let best = Move::normal(12, 28, PT_PAWN, PT_NONE);
        let other = Move::normal(6, 21, PT_KNIGHT, PT_NONE);
        let quiets = [other, best];
        tables.update_stats(0, best, &quiets, 6, Move(0), Move(0));
        assert!(tables.history_score(0, best) > 0);
        assert!(tables.history_score(0, other) < 0);
        // Other side's table untouched
        assert_eq!(tables.history_score(1, best), 0);
    }

    #[test]
    fn damping_limits_growth() {
        let tables = HistoryTables::new();
        let best = Move::normal(12, 28, PT_PAWN, PT_NONE);
        let quiets = [best];
        for _ in 0..1000 {
            tables.update_stats(0, best, &quiets, 17, Move(0), Move(0));
        }
        // Fixed point of v + 32b - v*b/324 is v = 32*324.
        let v = tables.history_score(0, best);
        assert!(v > 0 && v <= 32 * 324 + 1);
    }

    #[test]
    fn counter_move_slot() {
        let tables = HistoryTables::new();
        let reply = Move::normal(57, 42, PT_KNIGHT, PT_NONE);
        tables.set_counter_move(3, 28, reply);
        assert_eq!(tables.counter_move(3, 28), reply);
        assert!(tables.counter_move(3, 29).is_null());
    }

    #[test]
    fn continuation_tables_key_on_previous_move() {
        let tables = HistoryTables::new();
        let prev = Move::normal(12, 28, PT_PAWN, PT_NONE);
        let prev2 = Move::normal(11, 27, PT_PAWN, PT_NONE);
        let best = Move::normal(6, 21, PT_KNIGHT, PT_NONE);
        tables.update_stats(0, best, &[best], 8, prev, prev2);
        assert!(tables.cm_score(prev, best) > 0);
        assert!(tables.fu_score(prev2, best) > 0);
        // A different previous move sees nothing.
        let unrelated = Move::normal(5, 20, PT_PAWN, PT_NONE);
        assert_eq!(tables.cm_score(unrelated, best), 0);
    }
}
