use crate::board::Position;
use crate::history::HistoryTables;
use crate::movegen::{MoveGenerator, MoveList, MAX_MOVES};
use crate::moves::{Move, MoveKind};
use crate::see::see;

// MVV/LVA grid: victim major, attacker minor.
#[rustfmt::skip]
const MVV_LVA: [[i32; 6]; 6] = [
    [105, 104, 103, 102, 101, 100],
    [205, 204, 203, 202, 201, 200],
    [305, 304, 303, 302, 301, 300],
    [405, 404, 403, 402, 401, 400],
    [505, 504, 503, 502, 501, 500],
    [605, 604, 603, 602, 601, 600],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    HashMove,
    GenCaptures,
    WinningCaptures,
    Killer1,
    Killer2,
    Counter,
    GenQuiets,
    Quiets,
    LosingCaptures,
    Done,
}

/// Staged move source: hash move, then winning captures and promotions by
/// SEE (MVV/LVA breaking ties), killers, the counter move, quiets by
/// combined history, and finally the losing captures. Yields pseudo-legal
/// moves; the caller still confirms legality.
pub struct MovePicker {
    phase: Phase,
    hash_move: Move,
    killer1: Move,
    killer2: Move,
    counter: Move,
    captures: MoveList,
    capture_scores: [i32; MAX_MOVES],
    capture_idx: usize,
    losing: MoveList,
    losing_scores: [i32; MAX_MOVES],
    losing_idx: usize,
    quiets: MoveList,
    quiet_scores: [i32; MAX_MOVES],
    quiet_idx: usize,
    prev: Move,
    prev2: Move,
}

impl MovePicker {
    pub fn new(hash_move: Move, killers: [Move; 2], counter: Move, prev: Move, prev2: Move) -> Self {
        Self {
            phase: Phase::HashMove,
            hash_move,
            killer1: killers[0],
            killer2: killers[1],
            counter,
            captures: MoveList::new(),
            capture_scores: [0; MAX_MOVES],
            capture_idx: 0,
            losing: MoveList::new(),
            losing_scores: [0; MAX_MOVES],
            losing_idx: 0,
            quiets: MoveList::new(),
            quiet_scores: [0; MAX_MOVES],
            quiet_idx: 0,
            prev,
            prev2,
        }
    }

    /// Selection-sort step: swap the best remaining entry to `idx` and
    /// return it.
    fn pick_best(list: &mut MoveList, scores: &mut [i32; MAX_MOVES], idx: usize) -> Move {
        let mut best = idx;
        for j in (idx + 1)..list.count {
            if scores[j] > scores[best] {
                best = j;
            }
        }
        list.moves.swap(idx, best);
        scores.swap(idx, best);
        list.moves[idx]
    }

    fn is_special_quiet(&self, mv: Move) -> bool {
        mv == self.hash_move || mv == self.killer1 || mv == self.killer2 || mv == self.counter
    }

    pub fn next(&mut self, pos: &mut Position, history: &HistoryTables) -> Option<Move> {
        loop {
            match self.phase {
                Phase::HashMove => {
                    self.phase = Phase::GenCaptures;
                    if !self.hash_move.is_null() && pos.pseudo_legal(self.hash_move) {
                        return Some(self.hash_move);
                    }
                }
                Phase::GenCaptures => {
                    let mut gen = MoveGenerator::new();
                    gen.generate_captures(pos);
                    for i in 0..gen.list.count {
                        let mv = gen.list.moves[i];
                        if mv == self.hash_move {
                            continue;
                        }
                        let see_val = see(pos, mv);
                        let tiebreak = if mv.is_capture() {
                            let victim = if mv.kind() == MoveKind::EnPassant {
                                0
                            } else {
                                mv.capture() as usize
                            };
                            MVV_LVA[victim][mv.piece_moved() as usize]
                        } else {
                            // Quiet promotions slot in with the captures.
                            90
                        };
                        if see_val >= 0 {
                            self.captures.push(mv);
                            self.capture_scores[self.captures.count - 1] =
                                see_val * 1024 + tiebreak;
                        } else {
                            self.losing.push(mv);
                            self.losing_scores[self.losing.count - 1] = see_val * 1024 + tiebreak;
                        }
                    }
                    self.phase = Phase::WinningCaptures;
                }
                Phase::WinningCaptures => {
                    if self.capture_idx < self.captures.count {
                        let mv = Self::pick_best(
                            &mut self.captures,
                            &mut self.capture_scores,
                            self.capture_idx,
                        );
                        self.capture_idx += 1;
                        return Some(mv);
                    }
                    self.phase = Phase::Killer1;
                }
                Phase::Killer1 => {
                    self.phase = Phase::Killer2;
                    let k = self.killer1;
                    if !k.is_null() && k != self.hash_move && k.is_quiet() && pos.pseudo_legal(k) {
                        return Some(k);
                    }
                }
                Phase::Killer2 => {
                    self.phase = Phase::Counter;
                    let k = self.killer2;
                    if !k.is_null() && k != self.hash_move && k.is_quiet() && pos.pseudo_legal(k) {
                        return Some(k);
                    }
                }
                Phase::Counter => {
                    self.phase = Phase::GenQuiets;
                    let c = self.counter;
                    if !c.is_null()
                        && c != self.hash_move
                        && c != self.killer1
                        && c != self.killer2
                        && c.is_quiet()
                        && pos.pseudo_legal(c)
                    {
                        return Some(c);
                    }
                }
                Phase::GenQuiets => {
                    let mut gen = MoveGenerator::new();
                    gen.generate_all(pos);
                    for i in 0..gen.list.count {
                        let mv = gen.list.moves[i];
                        if !mv.is_quiet() || self.is_special_quiet(mv) {
                            continue;
                        }
                        self.quiets.push(mv);
                        self.quiet_scores[self.quiets.count - 1] =
                            history.ordering_score(pos.side, mv, self.prev, self.prev2);
                    }
                    self.phase = Phase::Quiets;
                }
                Phase::Quiets => {
                    if self.quiet_idx < self.quiets.count {
                        let mv = Self::pick_best(
                            &mut self.quiets,
                            &mut self.quiet_scores,
                            self.quiet_idx,
                        );
                        self.quiet_idx += 1;
                        return Some(mv);
                    }
                    self.phase = Phase::LosingCaptures;
                }
                Phase::LosingCaptures => {
                    if self.losing_idx < self.losing.count {
                        let mv = Self::pick_best(
                            &mut self.losing,
                            &mut self.losing_scores,
                            self.losing_idx,
                        );
                        self.losing_idx += 1;
                        return Some(mv);
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;
    use crate::moves::{Move, NULL_MOVE, PT_NONE, PT_PAWN};

    fn init() {
        crate::zobrist::init_zobrist();
        crate::bitboard::init_attack_tables();
        crate::movegen::init_move_tables();
    }

    fn drain(pos: &mut Position, mut picker: MovePicker, history: &HistoryTables) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some(mv) = picker.next(pos, history) {
            out.push(mv);
        }
        out
    }

    #[test]
    fn yields_every_move_exactly_once() {
        init();
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let mut gen = MoveGenerator::new();
        gen.generate_all(&pos);
        let expected = gen.list.count;

        let history = HistoryTables::new();
        let picker = MovePicker::new(NULL_MOVE, [NULL_MOVE; 2], NULL_MOVE, NULL_MOVE, NULL_MOVE);
        let yielded = drain(&mut pos, picker, &history);
        assert_eq!(yielded.len(), expected);
        for (i, a) in yielded.iter().enumerate() {
            for b in &yielded[i + 1..] {
                assert_ne!(a, b, "duplicate move {:?}", a);
            }
        }
    }

    #[test]
    fn hash_move_comes_first_and_is_not_repeated() {
        init();
        let mut pos = Position::startpos();
        let hash_move = Move::normal(12, 28, PT_PAWN, PT_NONE);
        let history = HistoryTables::new();
        let picker = MovePicker::new(hash_move, [NULL_MOVE; 2], NULL_MOVE, NULL_MOVE, NULL_MOVE);
        let yielded = drain(&mut pos, picker, &history);
        assert_eq!(yielded[0], hash_move);
        assert_eq!(yielded.iter().filter(|&&m| m == hash_move).count(), 1);
        assert_eq!(yielded.len(), 20);
    }

    #[test]
    fn winning_captures_precede_quiets_and_losers_come_last() {
        init();
        // White can win a pawn (exd5) or lose the exchange on a6, where the
        // b7 pawn recaptures the rook.
        let mut pos =
            Position::from_fen("4k3/1p6/p7/3p4/4P3/8/8/R3K3 w - - 0 1").unwrap();
        let history = HistoryTables::new();
        let picker = MovePicker::new(NULL_MOVE, [NULL_MOVE; 2], NULL_MOVE, NULL_MOVE, NULL_MOVE);
        let yielded = drain(&mut pos, picker, &history);

        let exd5 = yielded
            .iter()
            .position(|m| m.start() == 28 && m.dest() == 35)
            .expect("exd5 present");
        let rxa6 = yielded
            .iter()
            .position(|m| m.start() == 0 && m.dest() == 40)
            .expect("Rxa6 present");
        // The winning capture leads, the losing one trails every quiet.
        assert_eq!(exd5, 0);
        assert_eq!(rxa6, yielded.len() - 1);
    }

    #[test]
    fn killers_follow_captures() {
        init();
        let mut pos =
            Position::from_fen("4k3/1p6/p7/3p4/4P3/8/8/R3K3 w - - 0 1").unwrap();
        let killer = Move::normal(4, 12, crate::moves::PT_KING, PT_NONE); // Ke1-e2
        let history = HistoryTables::new();
        let picker = MovePicker::new(NULL_MOVE, [killer, NULL_MOVE], NULL_MOVE, NULL_MOVE, NULL_MOVE);
        let yielded = drain(&mut pos, picker, &history);
        // exd5 first, then the killer before other quiets.
        assert_eq!(yielded[0].dest(), 35);
        assert_eq!(yielded[1], killer);
    }
}
