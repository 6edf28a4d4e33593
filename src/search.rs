// src/search.rs
use crate::board::{piece_index, Position, WHITE};
use crate::eval::{self, INFINITE, INVALID_SCORE, MATE, MATE_RANGE};
use crate::history::HistoryTables;
use crate::movegen::MoveGenerator;
use crate::moves::{Move, MoveKind, NULL_MOVE, PT_PAWN};
use crate::ordering::MovePicker;
use crate::params::SearchParams;
use crate::see::see;
use crate::syzygy;
use crate::time::TimeManager;
use crate::tt::{
    TranspositionTable, EVAL_NONE, FLAG_EXACT, FLAG_LOWER, FLAG_UPPER,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const MAX_PLY: usize = 128;
const MAX_QUIETS: usize = 64;

// Node flags
pub const NF_IID: u8 = 1;
pub const NF_VERIFY: u8 = 2;
pub const NF_EXACT: u8 = 4;
pub const NF_SINGULAR: u8 = 8;
pub const NF_PROBCUT: u8 = 16;

const TIME_CHECK_MASK: u64 = 0xFFF;

#[derive(Clone)]
pub enum Limits {
    Infinite,
    FixedDepth(i32),
    FixedNodes(u64),
    Time(TimeManager),
}

pub type PostFunction = Box<dyn FnMut(&Statistics) + Send>;
pub type MonitorFunction = Box<dyn FnMut(&Statistics) -> i32 + Send>;

/// State shared by every worker of one search: the transposition table,
/// the heuristic tables, counters, and the cooperative stop flag.
pub struct SharedState {
    pub tt: Arc<TranspositionTable>,
    pub history: Arc<HistoryTables>,
    pub params: Arc<SearchParams>,
    pub stop: Arc<AtomicBool>,
    pub nodes: AtomicU64,
    pub tb_hits: AtomicU64,
    pub bonus_time: AtomicI64,
    pub background: Arc<AtomicBool>,
    pub post: Arc<Mutex<Option<PostFunction>>>,
    pub monitor: Arc<Mutex<Option<MonitorFunction>>>,
    pub contempt: i32,
    pub computer_side: usize,
}

#[derive(Clone, Default)]
pub struct Statistics {
    pub depth: i32,
    pub completed_depth: i32,
    pub seldepth: usize,
    pub score: i32,
    pub best_move: Move,
    pub ponder_move: Move,
    pub pv: Vec<Move>,
    pub nodes: u64,
    pub tb_hits: u64,
    pub elapsed_ms: u64,
    pub fail_high: bool,
    pub fail_low: bool,
    pub stopped: bool,
}

impl Statistics {
    pub fn nps(&self) -> u64 {
        if self.elapsed_ms > 0 {
            self.nodes * 1000 / self.elapsed_ms
        } else {
            0
        }
    }
}

/// Per-ply search node. The PV array is indexed by absolute ply; a parent
/// copies its child's tail after each new best move.
#[derive(Clone)]
pub struct NodeInfo {
    pub alpha: i32,
    pub beta: i32,
    pub best_score: i32,
    pub best: Move,
    pub last_move: Move,
    pub eval: i32,
    pub static_eval: i32,
    pub pv: [Move; MAX_PLY],
    pub pv_length: usize,
    pub quiets: [Move; MAX_QUIETS],
    pub num_quiets: usize,
    pub num_legal: usize,
    pub flags: u8,
    pub singular_move: Move,
    pub ply: usize,
    pub depth: i32,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            alpha: 0,
            beta: 0,
            best_score: 0,
            best: NULL_MOVE,
            last_move: NULL_MOVE,
            eval: INVALID_SCORE,
            static_eval: INVALID_SCORE,
            pv: [NULL_MOVE; MAX_PLY],
            pv_length: 0,
            quiets: [NULL_MOVE; MAX_QUIETS],
            num_quiets: 0,
            num_legal: 0,
            flags: 0,
            singular_move: NULL_MOVE,
            ply: 0,
            depth: 0,
        }
    }
}

impl NodeInfo {
    #[inline(always)]
    pub fn is_pv(&self) -> bool {
        self.beta > self.alpha + 1
    }
}

struct RootMove {
    mv: Move,
    score: i32,
    prev_score: i32,
}

/// Best move and score of one completed root iteration.
#[derive(Clone, Copy)]
pub struct SearchHistory {
    pub best: Move,
    pub score: i32,
}

/// One worker's search: a private board and node stack over the shared
/// tables. Worker 0 is the main thread and drives time management.
pub struct Search {
    pub board: Position,
    nodes_stack: Vec<NodeInfo>,
    killers: Vec<[Move; 2]>,
    shared: Arc<SharedState>,
    pub limits: Limits,
    pub thread_id: usize,
    pub nodes: u64,
    pub tb_hits: u64,
    pub seldepth: usize,
    pub stopped: bool,
    pub stats: Statistics,
    iteration_depth: i32,
    root_moves: Vec<RootMove>,
    pub search_history: Vec<SearchHistory>,
    exclude: Vec<Move>,
    include: Vec<Move>,
}

impl Search {
    pub fn new(
        board: Position,
        limits: Limits,
        shared: Arc<SharedState>,
        thread_id: usize,
    ) -> Self {
        Self {
            board,
            nodes_stack: vec![NodeInfo::default(); MAX_PLY + 2],
            killers: vec![[NULL_MOVE; 2]; MAX_PLY + 2],
            shared,
            limits,
            thread_id,
            nodes: 0,
            tb_hits: 0,
            seldepth: 0,
            stopped: false,
            stats: Statistics::default(),
            iteration_depth: 0,
            root_moves: Vec::new(),
            search_history: Vec::new(),
            exclude: Vec::new(),
            include: Vec::new(),
        }
    }

    pub fn set_root_move_filter(&mut self, exclude: Vec<Move>, include: Vec<Move>) {
        self.exclude = exclude;
        self.include = include;
    }

    #[inline(always)]
    pub fn main_thread(&self) -> bool {
        self.thread_id == 0
    }

    fn draw_score(&self) -> i32 {
        let contempt = self.shared.contempt;
        if contempt == 0 {
            return 0;
        }
        if self.board.side == self.shared.computer_side {
            -contempt
        } else {
            contempt
        }
    }

    fn check_limits(&mut self) {
        if self.stopped {
            return;
        }
        if self.shared.stop.load(Ordering::Relaxed) {
            self.stopped = true;
            return;
        }
        match &self.limits {
            Limits::FixedNodes(limit) => {
                if self.nodes >= *limit {
                    self.stopped = true;
                    self.shared.stop.store(true, Ordering::Relaxed);
                }
            }
            Limits::Time(tm) => {
                if self.main_thread()
                    && !self.shared.background.load(Ordering::Relaxed)
                    && tm.hard_expired()
                {
                    self.stopped = true;
                    self.shared.stop.store(true, Ordering::Relaxed);
                }
            }
            Limits::FixedDepth(_) | Limits::Infinite => {}
        }

        // External monitor, polled on the main thread only.
        if self.main_thread() && !self.stopped {
            let mut guard = self.shared.monitor.lock().unwrap();
            if let Some(monitor) = guard.as_mut() {
                let mut snapshot = self.stats.clone();
                snapshot.nodes = self.shared.nodes.load(Ordering::Relaxed) + self.nodes;
                if monitor(&snapshot) != 0 {
                    self.stopped = true;
                    self.shared.stop.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    #[inline(always)]
    fn count_node(&mut self) {
        self.nodes += 1;
        if self.nodes & TIME_CHECK_MASK == 0 {
            self.shared
                .nodes
                .fetch_add(TIME_CHECK_MASK + 1, Ordering::Relaxed);
            self.check_limits();
        }
    }

    fn init_node(&mut self, ply: usize, alpha: i32, beta: i32, depth: i32, flags: u8, singular: Move) {
        let node = &mut self.nodes_stack[ply];
        node.alpha = alpha;
        node.beta = beta;
        node.best_score = -INFINITE;
        node.best = NULL_MOVE;
        node.last_move = NULL_MOVE;
        node.pv_length = 0;
        node.num_quiets = 0;
        node.num_legal = 0;
        node.flags = flags;
        node.singular_move = singular;
        node.ply = ply;
        node.depth = depth;
    }

    fn update_pv(&mut self, ply: usize, mv: Move) {
        let (front, back) = self.nodes_stack.split_at_mut(ply + 1);
        let node = &mut front[ply];
        let child = &back[0];
        node.pv[ply] = mv;
        let len = child.pv_length.min(MAX_PLY - ply - 1);
        for i in 0..len {
            node.pv[ply + 1 + i] = child.pv[ply + 1 + i];
        }
        node.pv_length = len + 1;
    }

    // --- QUIESCENCE ---

    fn quiescence(&mut self, mut alpha: i32, beta: i32, ply: usize, qdepth: i32) -> i32 {
        self.count_node();
        if self.stopped {
            return 0;
        }
        if ply > self.seldepth {
            self.seldepth = ply;
        }
        if ply >= MAX_PLY {
            return eval::evaluate(&self.board);
        }
        if self.board.is_fifty_move_draw()
            || self.board.material_draw()
            || self.board.rep_count(1) >= 1
        {
            return self.draw_score();
        }

        let in_check = self.board.in_check();
        let mut best_score = -INFINITE;

        if !in_check {
            let stand_pat = eval::evaluate(&self.board);
            if stand_pat >= beta {
                return stand_pat;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
            best_score = stand_pat;
        }

        let delta = self.shared.params.qsearch_delta;

        // Evasions when in check; captures and promotions otherwise, plus
        // quiet checking moves at the first quiescence ply.
        let mut gen = MoveGenerator::new();
        if in_check || qdepth >= 0 {
            gen.generate_all(&self.board);
        } else {
            gen.generate_captures(&self.board);
        }

        // Order by victim value, promotions on top.
        let mut scores = [0i32; crate::movegen::MAX_MOVES];
        for i in 0..gen.list.count {
            let mv = gen.list.moves[i];
            let mut s = 0;
            if mv.is_capture() {
                let victim = if mv.kind() == MoveKind::EnPassant {
                    PT_PAWN
                } else {
                    mv.capture()
                };
                s += crate::board::PIECE_VALUES[victim as usize];
            }
            if mv.is_promotion() {
                s += 800;
            }
            scores[i] = s;
        }

        let mut legal = 0usize;
        for i in 0..gen.list.count {
            let mut best_idx = i;
            for j in (i + 1)..gen.list.count {
                if scores[j] > scores[best_idx] {
                    best_idx = j;
                }
            }
            gen.list.moves.swap(i, best_idx);
            scores.swap(i, best_idx);
            let mv = gen.list.moves[i];

            if !in_check {
                if mv.is_capture() {
                    // Skip losing captures outright.
                    if see(&self.board, mv) < 0 {
                        continue;
                    }
                    // Futility: even winning the piece cannot reach alpha.
                    let victim = if mv.kind() == MoveKind::EnPassant {
                        crate::board::PIECE_VALUES[PT_PAWN as usize]
                    } else {
                        crate::board::PIECE_VALUES[mv.capture() as usize % 6]
                    };
                    if best_score + victim + delta < alpha && !mv.is_promotion() {
                        continue;
                    }
                } else if mv.is_promotion() {
                    if see(&self.board, mv) < 0 {
                        continue;
                    }
                } else {
                    // Quiet checks only at the first quiescence ply, and
                    // only when the checking piece is not simply lost.
                    if !self.board.would_check(mv) || see(&self.board, mv) < 0 {
                        continue;
                    }
                }
            }

            if !self.board.is_legal(mv) {
                continue;
            }
            legal += 1;

            let gives_check = self.board.would_check(mv);
            let saved = self.board.do_move(mv);
            self.board.set_check_status(gives_check);
            let score = -self.quiescence(-beta, -alpha, ply + 1, qdepth - 1);
            self.board.undo_move(mv, saved);

            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        if in_check && legal == 0 {
            return -MATE + ply as i32;
        }

        best_score
    }

    // --- MAIN SEARCH ---

    #[allow(clippy::too_many_arguments)]
    fn search(
        &mut self,
        mut alpha: i32,
        mut beta: i32,
        ply: usize,
        depth: i32,
        flags: u8,
        singular: Move,
    ) -> i32 {
        let is_pv = beta > alpha + 1;
        self.init_node(ply, alpha, beta, depth, flags, singular);

        self.count_node();
        if self.stopped {
            return 0;
        }

        if ply > self.seldepth {
            self.seldepth = ply;
        }
        if ply >= MAX_PLY {
            return eval::evaluate(&self.board);
        }

        // Draws: 50-move, insufficient material, twofold within the tree.
        if self.board.is_fifty_move_draw()
            || self.board.material_draw()
            || self.board.rep_count(1) >= 1
        {
            return self.draw_score();
        }

        if depth <= 0 {
            return self.quiescence(alpha, beta, ply, 0);
        }

        // Mate-distance pruning.
        alpha = alpha.max(-MATE + ply as i32);
        beta = beta.min(MATE - ply as i32 - 1);
        if alpha >= beta {
            return alpha;
        }

        let tt = Arc::clone(&self.shared.tt);
        let params = Arc::clone(&self.shared.params);
        let history = Arc::clone(&self.shared.history);

        // Transposition table.
        let mut hash_move = NULL_MOVE;
        let mut tt_score = INVALID_SCORE;
        let mut tt_depth = -1;
        let mut tt_kind = crate::tt::FLAG_NONE;
        let mut tt_eval = EVAL_NONE;
        if let Some(hit) = tt.probe(self.board.hash(), ply) {
            tt_score = hit.score;
            tt_depth = hit.depth;
            tt_kind = hit.kind;
            tt_eval = hit.static_eval;
            hash_move = self.board.decode_tt_move(hit.mv);

            if !is_pv && singular.is_null() && hit.depth >= depth {
                match hit.kind {
                    FLAG_EXACT => return hit.score,
                    FLAG_LOWER if hit.score >= beta => return hit.score,
                    FLAG_UPPER if hit.score <= alpha => return hit.score,
                    _ => {}
                }
            }
        }

        // Endgame tablebases: in-tree WDL probe.
        if singular.is_null()
            && syzygy::usable(&self.board)
        {
            if let Some(tb_score) = syzygy::probe_wdl(&self.board, ply) {
                self.tb_hits += 1;
                self.shared.tb_hits.fetch_add(1, Ordering::Relaxed);
                return tb_score;
            }
        }

        let in_check = self.board.in_check();

        // Static evaluation, reusing a cached value when the TT has one.
        let static_eval = if in_check {
            INVALID_SCORE
        } else if tt_eval != EVAL_NONE {
            tt_eval
        } else {
            eval::evaluate(&self.board)
        };
        self.nodes_stack[ply].static_eval = static_eval;
        self.nodes_stack[ply].eval = static_eval;

        let improving = !in_check
            && ply >= 2
            && self.nodes_stack[ply - 2].static_eval != INVALID_SCORE
            && static_eval > self.nodes_stack[ply - 2].static_eval;

        let prev = if ply > 0 {
            self.nodes_stack[ply - 1].last_move
        } else {
            NULL_MOVE
        };
        let prev2 = if ply > 1 {
            self.nodes_stack[ply - 2].last_move
        } else {
            NULL_MOVE
        };

        // Razoring: hopeless static eval at low depth drops to quiescence.
        if !is_pv
            && !in_check
            && singular.is_null()
            && depth <= params.razor_max_depth
            && static_eval + params.razor_margin(depth) <= alpha
        {
            let score = self.quiescence(alpha, beta, ply, 0);
            if self.stopped {
                return 0;
            }
            if score <= alpha {
                return score;
            }
        }

        // Reverse futility: static eval comfortably over beta.
        if !is_pv
            && !in_check
            && singular.is_null()
            && depth <= params.rfp_max_depth
            && static_eval != INVALID_SCORE
            && static_eval - params.rfp_margin_at(depth) >= beta
            && beta.abs() < MATE_RANGE
        {
            return static_eval;
        }

        // Null-move pruning. Never two nulls in a row, never in check, and
        // only with non-pawn material on the board.
        if !is_pv
            && !in_check
            && singular.is_null()
            && flags & NF_VERIFY == 0
            && depth >= params.nmp_min_depth
            && static_eval >= beta
            && !prev.is_null()
            && self.board.material[self.board.side].has_non_pawn()
        {
            let r = params.nmp_base
                + depth / params.nmp_depth_divisor
                + ((static_eval - beta) / params.nmp_eval_divisor).min(3);
            self.nodes_stack[ply].last_move = NULL_MOVE;
            let saved = self.board.do_null_move();
            self.board.set_check_status(false);
            let score = -self.search(-beta, -beta + 1, ply + 1, depth - 1 - r, 0, NULL_MOVE);
            self.board.undo_null_move(saved);
            if self.stopped {
                return 0;
            }
            if score >= beta {
                // Verify at high depth with null move disabled.
                if depth >= params.nmp_verify_depth {
                    let verified =
                        self.search(beta - 1, beta, ply, depth - 1 - r, NF_VERIFY, NULL_MOVE);
                    self.init_node(ply, alpha, beta, depth, flags, singular);
                    self.nodes_stack[ply].static_eval = static_eval;
                    if self.stopped {
                        return 0;
                    }
                    if verified >= beta {
                        return if verified > MATE_RANGE { beta } else { verified };
                    }
                } else {
                    return if score > MATE_RANGE { beta } else { score };
                }
            }
        }

        // ProbCut: a capture that beats beta by a margin even after a
        // shallow verification search prunes the node.
        if !is_pv
            && !in_check
            && singular.is_null()
            && flags & NF_PROBCUT == 0
            && depth >= params.probcut_min_depth
            && beta.abs() < MATE_RANGE
        {
            let prob_beta = beta + params.probcut_margin;
            let mut gen = MoveGenerator::new();
            gen.generate_captures(&self.board);
            for i in 0..gen.list.count {
                let mv = gen.list.moves[i];
                if static_eval + see(&self.board, mv) < prob_beta {
                    continue;
                }
                if !self.board.is_legal(mv) {
                    continue;
                }
                let gives_check = self.board.would_check(mv);
                self.nodes_stack[ply].last_move = mv;
                let saved = self.board.do_move(mv);
                self.board.set_check_status(gives_check);
                let mut score =
                    -self.quiescence(-prob_beta, -prob_beta + 1, ply + 1, 0);
                if score >= prob_beta {
                    score = -self.search(
                        -prob_beta,
                        -prob_beta + 1,
                        ply + 1,
                        depth - params.probcut_reduction,
                        NF_PROBCUT,
                        NULL_MOVE,
                    );
                }
                self.board.undo_move(mv, saved);
                if self.stopped {
                    return 0;
                }
                if score >= prob_beta {
                    return score;
                }
            }
            self.init_node(ply, alpha, beta, depth, flags, singular);
            self.nodes_stack[ply].static_eval = static_eval;
        }

        // Internal iterative deepening populates a hash move for PV nodes.
        if is_pv && hash_move.is_null() && depth >= params.iid_min_depth && singular.is_null() {
            self.search(alpha, beta, ply, depth - params.iid_reduction, NF_IID, NULL_MOVE);
            self.init_node(ply, alpha, beta, depth, flags, singular);
            self.nodes_stack[ply].static_eval = static_eval;
            if self.stopped {
                return 0;
            }
            if let Some(hit) = tt.probe(self.board.hash(), ply) {
                hash_move = self.board.decode_tt_move(hit.mv);
            }
        }

        // Singular extension: if every other move fails a reduced search
        // below ttScore - margin, the hash move is singular.
        let mut singular_extension = 0;
        if singular.is_null()
            && depth >= params.singular_min_depth
            && !hash_move.is_null()
            && tt_depth >= depth - 3
            && (tt_kind == FLAG_LOWER || tt_kind == FLAG_EXACT)
            && tt_score.abs() < MATE_RANGE
        {
            let s_beta = tt_score - params.singular_margin_mult * depth;
            let score = self.search(
                s_beta - 1,
                s_beta,
                ply,
                (depth - 1) / 2,
                NF_SINGULAR,
                hash_move,
            );
            self.init_node(ply, alpha, beta, depth, flags, singular);
            self.nodes_stack[ply].static_eval = static_eval;
            if self.stopped {
                return 0;
            }
            if score < s_beta {
                singular_extension = 1;
            } else if s_beta >= beta {
                // Multicut: even the alternatives fail high.
                return s_beta;
            }
        }

        // --- MOVE LOOP ---
        let counter = if !prev.is_null() {
            history.counter_move(
                piece_index(1 - self.board.side, prev.piece_moved()),
                prev.dest(),
            )
        } else {
            NULL_MOVE
        };
        let killers = self.killers[ply];
        let mut picker = MovePicker::new(hash_move, killers, counter, prev, prev2);

        let original_alpha = alpha;
        let mut best_score = -INFINITE;
        let mut best_move = NULL_MOVE;
        let mut moves_tried = 0usize;
        let mut quiets_tried = 0usize;

        while let Some(mv) = picker.next(&mut self.board, &history) {
            if flags & NF_SINGULAR != 0 && mv == singular {
                continue;
            }
            if !self.board.is_legal(mv) {
                continue;
            }
            self.nodes_stack[ply].num_legal += 1;

            let quiet = mv.is_quiet();
            let gives_check = self.board.would_check(mv);

            // Extensions: checks that do not lose material, the singular
            // hash move, near-root recaptures, and pawns reaching the 7th.
            let mut ext = 0;
            if gives_check && see(&self.board, mv) >= 0 {
                ext = 1;
            }
            if mv == hash_move {
                ext += singular_extension;
            }
            if mv.is_capture()
                && prev.is_capture()
                && mv.dest() == prev.dest()
                && (ply as i32) * 2 <= self.iteration_depth
            {
                ext = ext.max(1);
            }
            if mv.piece_moved() == PT_PAWN {
                let side = self.board.side;
                let rel_rank = if side == WHITE {
                    mv.dest() / 8
                } else {
                    7 - mv.dest() / 8
                };
                // Only a passed pawn one step from promotion is worth the
                // extra ply. The span is taken from the start square: from
                // the 7th itself it holds only promotion-rank squares and
                // the test would never fail.
                if rel_rank == 6 {
                    let stoppers = crate::bitboard::passed_pawn_mask(side, mv.start())
                        & self.board.bitboards[piece_index(1 - side, PT_PAWN)];
                    if stoppers.is_empty() {
                        ext = ext.max(1);
                    }
                }
            }
            let ext = ext.min(1);

            // Move-loop pruning, never while a mate score is unresolved.
            if best_score > -MATE_RANGE && !in_check && ply > 0 {
                // Late-move pruning.
                if !is_pv
                    && quiet
                    && !gives_check
                    && depth <= params.lmp_max_depth
                    && quiets_tried >= params.lmp_count(depth, improving)
                {
                    continue;
                }
                // SEE pruning.
                if depth <= params.see_prune_max_depth
                    && moves_tried > 0
                    && see(&self.board, mv) < params.see_margin(depth, quiet)
                {
                    continue;
                }
                // Futility.
                if !is_pv
                    && quiet
                    && !gives_check
                    && depth <= params.futility_max_depth
                    && static_eval != INVALID_SCORE
                    && static_eval + params.futility_margin_at(depth) <= alpha
                {
                    quiets_tried += 1;
                    continue;
                }
            }

            self.nodes_stack[ply].last_move = mv;
            tt.prefetch(self.board.hash_after(mv));
            let saved = self.board.do_move(mv);
            self.board.set_check_status(gives_check);
            moves_tried += 1;
            if quiet {
                quiets_tried += 1;
                let n = self.nodes_stack[ply].num_quiets;
                if n < MAX_QUIETS {
                    self.nodes_stack[ply].quiets[n] = mv;
                    self.nodes_stack[ply].num_quiets = n + 1;
                }
            }

            let new_depth = depth - 1 + ext;
            let mut score;

            if moves_tried == 1 {
                score = -self.search(-beta, -alpha, ply + 1, new_depth, 0, NULL_MOVE);
            } else {
                // Late-move reduction for the scout search.
                let mut r = 0;
                if depth >= 3 && quiet && !gives_check && !in_check {
                    r = params.lmr(depth, moves_tried);
                    if !improving {
                        r += 1;
                    }
                    if !is_pv {
                        r += 1;
                    }
                    if mv == killers[0] || mv == killers[1] || mv == counter {
                        r -= 1;
                    }
                    r -= (history.ordering_score(1 - self.board.side, mv, prev, prev2) / 8192)
                        .clamp(-2, 2);
                    r = r.clamp(0, depth - 1);
                }

                score = -self.search(-alpha - 1, -alpha, ply + 1, new_depth - r, 0, NULL_MOVE);
                if score > alpha && r > 0 {
                    score = -self.search(-alpha - 1, -alpha, ply + 1, new_depth, 0, NULL_MOVE);
                }
                if score > alpha && score < beta {
                    score = -self.search(-beta, -alpha, ply + 1, new_depth, 0, NULL_MOVE);
                }
            }

            self.board.undo_move(mv, saved);
            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
                self.nodes_stack[ply].best = mv;
                if score > alpha {
                    alpha = score;
                    if is_pv {
                        self.update_pv(ply, mv);
                    }
                    if score >= beta {
                        // Cutoff bookkeeping: killers, counter move, and
                        // the history family for quiet moves.
                        if quiet {
                            if self.killers[ply][0] != mv {
                                self.killers[ply][1] = self.killers[ply][0];
                                self.killers[ply][0] = mv;
                            }
                            if !prev.is_null() {
                                history.set_counter_move(
                                    piece_index(1 - self.board.side, prev.piece_moved()),
                                    prev.dest(),
                                    mv,
                                );
                            }
                            let n = self.nodes_stack[ply].num_quiets;
                            let quiets = &self.nodes_stack[ply].quiets[..n];
                            history.update_stats(
                                self.board.side,
                                mv,
                                quiets,
                                depth,
                                prev,
                                prev2,
                            );
                        }
                        break;
                    }
                }
            }
        }

        if self.nodes_stack[ply].num_legal == 0 {
            if flags & NF_SINGULAR != 0 {
                // Only the excluded move was legal.
                return alpha;
            }
            return if in_check {
                -MATE + ply as i32
            } else {
                self.draw_score()
            };
        }

        if singular.is_null() && !self.stopped {
            let kind = if best_score >= beta {
                FLAG_LOWER
            } else if best_score > original_alpha {
                FLAG_EXACT
            } else {
                FLAG_UPPER
            };
            let stored_eval = if in_check { EVAL_NONE } else { static_eval };
            tt.store(
                self.board.hash(),
                depth,
                ply,
                best_score,
                kind,
                best_move.to_tt(),
                stored_eval,
            );
        }

        best_score
    }

    // --- ROOT ---

    fn generate_root_moves(&mut self) {
        self.root_moves.clear();
        let mut gen = MoveGenerator::new();
        gen.generate_all(&self.board);
        for i in 0..gen.list.count {
            let mv = gen.list.moves[i];
            if !self.board.is_legal(mv) {
                continue;
            }
            if self.exclude.contains(&mv) {
                continue;
            }
            if !self.include.is_empty() && !self.include.contains(&mv) {
                continue;
            }
            self.root_moves.push(RootMove {
                mv,
                score: -INFINITE,
                prev_score: -INFINITE,
            });
        }
    }

    fn root_search(&mut self, depth: i32, mut alpha: i32, beta: i32) -> i32 {
        self.init_node(0, alpha, beta, depth, 0, NULL_MOVE);

        let mut best_score = -INFINITE;
        let mut best_index = 0usize;

        for i in 0..self.root_moves.len() {
            let mv = self.root_moves[i].mv;
            self.root_moves[i].prev_score = self.root_moves[i].score;
            self.root_moves[i].score = -INFINITE;

            let gives_check = self.board.would_check(mv);
            self.nodes_stack[0].last_move = mv;
            let saved = self.board.do_move(mv);
            self.board.set_check_status(gives_check);

            let mut score;
            if i == 0 {
                score = -self.search(-beta, -alpha, 1, depth - 1, 0, NULL_MOVE);
            } else {
                score = -self.search(-alpha - 1, -alpha, 1, depth - 1, 0, NULL_MOVE);
                if score > alpha && score < beta {
                    score = -self.search(-beta, -alpha, 1, depth - 1, 0, NULL_MOVE);
                }
            }

            self.board.undo_move(mv, saved);
            if self.stopped {
                return best_score;
            }

            self.root_moves[i].score = score;
            if score > best_score {
                best_score = score;
                best_index = i;
                if score > alpha {
                    alpha = score;
                    self.update_pv(0, mv);
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        // Keep the best move in front for the next iteration.
        if best_index > 0 {
            self.root_moves.swap(0, best_index);
        }
        best_score
    }

    fn aspiration(&mut self, depth: i32, last_score: i32) -> i32 {
        let params = Arc::clone(&self.shared.params);
        let mut alpha = -INFINITE;
        let mut beta = INFINITE;
        let mut delta = params.aspiration_window;
        if depth >= params.aspiration_min_depth && last_score.abs() < MATE_RANGE {
            alpha = last_score - delta;
            beta = last_score + delta;
        }

        let mut fail_highs = 0;
        let mut fail_lows = 0;
        loop {
            if alpha < -3000 {
                alpha = -INFINITE;
            }
            if beta > 3000 {
                beta = INFINITE;
            }

            let score = self.root_search(depth, alpha, beta);
            if self.stopped {
                return score;
            }

            if score <= alpha {
                fail_lows += 1;
                self.stats.fail_low = true;
                if self.main_thread() {
                    // A dropping root score buys the most extra time.
                    if let Limits::Time(tm) = &self.limits {
                        self.shared
                            .bonus_time
                            .store(tm.xtra_time as i64, Ordering::Relaxed);
                    }
                }
                beta = (alpha + beta) / 2;
                alpha = if fail_lows >= 3 {
                    -INFINITE
                } else {
                    (-INFINITE).max(alpha - delta)
                };
                delta += delta / 2 + delta / 4;
            } else if score >= beta {
                fail_highs += 1;
                self.stats.fail_high = true;
                if self.main_thread() {
                    if let Limits::Time(tm) = &self.limits {
                        self.shared
                            .bonus_time
                            .store(tm.xtra_time as i64 / 2, Ordering::Relaxed);
                    }
                }
                beta = if fail_highs >= 3 {
                    INFINITE
                } else {
                    INFINITE.min(beta + delta)
                };
                delta += delta / 2 + delta / 4;
            } else {
                self.stats.fail_high = false;
                self.stats.fail_low = false;
                if self.main_thread() {
                    self.shared.bonus_time.store(0, Ordering::Relaxed);
                }
                return score;
            }
        }
    }

    /// Iterative deepening: the worker's whole search. Helper threads run
    /// the identical loop with a small depth skew to spread the work.
    pub fn run(&mut self) -> Statistics {
        let start = std::time::Instant::now();
        self.generate_root_moves();

        if self.root_moves.is_empty() {
            self.stats.score = if self.board.in_check() { -MATE } else { self.draw_score() };
            return self.stats.clone();
        }

        let max_depth = match self.limits {
            Limits::FixedDepth(d) => d.clamp(1, MAX_PLY as i32 - 8),
            _ => MAX_PLY as i32 - 8,
        };

        let mut last_score = 0;
        let mut stability = 0u32;
        self.search_history.clear();

        for iteration in 1..=max_depth {
            // Depth skew decorrelates helper threads.
            let depth = if self.main_thread() {
                iteration
            } else {
                (iteration + ((self.thread_id as i32 + iteration) & 1)).min(max_depth)
            };
            self.iteration_depth = depth;
            self.seldepth = 0;

            let score = self.aspiration(depth, last_score);
            if self.stopped {
                break;
            }
            last_score = score;

            // Commit the completed iteration.
            self.stats.depth = depth;
            self.stats.completed_depth = depth;
            self.stats.seldepth = self.seldepth;
            self.stats.score = score;
            let root = &self.nodes_stack[0];
            self.stats.pv = root.pv[..root.pv_length].to_vec();
            if let Some(&mv) = self.stats.pv.first() {
                self.stats.best_move = mv;
            }
            self.stats.ponder_move = self.stats.pv.get(1).copied().unwrap_or(NULL_MOVE);
            self.stats.nodes = self.shared.nodes.load(Ordering::Relaxed) + (self.nodes & TIME_CHECK_MASK);
            self.stats.tb_hits = self.shared.tb_hits.load(Ordering::Relaxed);
            self.stats.elapsed_ms = start.elapsed().as_millis() as u64;

            let previous_best = self.search_history.last().map(|h| h.best);
            self.search_history.push(SearchHistory {
                best: self.stats.best_move,
                score,
            });

            if self.main_thread() {
                if let Some(post) = self.shared.post.lock().unwrap().as_mut() {
                    post(&self.stats);
                }

                // Root-move stability scales the soft time limit.
                if previous_best == Some(self.stats.best_move) {
                    stability += 1;
                } else {
                    stability = 0;
                }

                if let Limits::Time(ref mut tm) = self.limits {
                    if depth > 4 {
                        let factor = match stability {
                            0 => 2.50,
                            1 => 1.20,
                            2 => 0.90,
                            3 => 0.80,
                            _ => 0.75,
                        };
                        tm.set_stability_factor(factor);
                    }
                }

                let mut stop_now = false;
                // A proven mate within the horizon ends the search.
                if eval::is_mate_score(score) && eval::mate_distance(score) <= depth {
                    stop_now = true;
                }
                // A single legal reply needs no deep thought when on the
                // clock, unless pondering.
                if self.root_moves.len() == 1
                    && matches!(self.limits, Limits::Time(_))
                    && !self.shared.background.load(Ordering::Relaxed)
                    && depth >= 5
                {
                    stop_now = true;
                }
                if let Limits::Time(tm) = &self.limits {
                    let bonus = self.shared.bonus_time.load(Ordering::Relaxed);
                    if !self.shared.background.load(Ordering::Relaxed)
                        && tm.soft_expired(bonus)
                    {
                        stop_now = true;
                    }
                }
                if stop_now {
                    self.shared.stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        // Flush the remaining node count.
        self.shared
            .nodes
            .fetch_add(self.nodes & TIME_CHECK_MASK, Ordering::Relaxed);

        if self.stats.best_move.is_null() {
            // No completed iteration: fall back to the first root move.
            self.stats.best_move = self.root_moves[0].mv;
        }
        self.stats.stopped = self.stopped;
        self.stats.elapsed_ms = start.elapsed().as_millis() as u64;
        self.stats.nodes = self.shared.nodes.load(Ordering::Relaxed);
        self.stats.tb_hits = self.shared.tb_hits.load(Ordering::Relaxed);
        self.stats.clone()
    }
}
