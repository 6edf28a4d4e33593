use crate::board::Position;
use crate::history::HistoryTables;
use crate::moves::Move;
use crate::params::SearchParams;
use crate::search::{
    Limits, MonitorFunction, PostFunction, Search, SharedState, Statistics,
};
use crate::syzygy;
use crate::threads::{best_stats, ThreadPool};
use crate::time::TimeManager;
use crate::tt::{TableError, TranspositionTable};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    FixedDepth,
    TimeLimit,
    FixedTime,
}

/// Owns everything that outlives a single search: the transposition table,
/// the heuristic tables, the worker pool, and the callback hooks. One
/// controller drives one engine instance.
pub struct SearchController {
    tt: Arc<TranspositionTable>,
    history: Arc<HistoryTables>,
    params: Arc<SearchParams>,
    pool: ThreadPool,
    stop: Arc<AtomicBool>,
    background: Arc<AtomicBool>,
    post: Arc<Mutex<Option<PostFunction>>>,
    monitor: Arc<Mutex<Option<MonitorFunction>>>,
    contempt: i32,
    searching: bool,
    last_stats: Statistics,
}

impl SearchController {
    pub fn new(hash_mb: usize, threads: usize) -> Result<Self, TableError> {
        Ok(Self {
            tt: Arc::new(TranspositionTable::new(hash_mb)?),
            history: Arc::new(HistoryTables::new()),
            params: Arc::new(SearchParams::default()),
            pool: ThreadPool::new(threads),
            stop: Arc::new(AtomicBool::new(false)),
            background: Arc::new(AtomicBool::new(false)),
            post: Arc::new(Mutex::new(None)),
            monitor: Arc::new(Mutex::new(None)),
            contempt: 0,
            searching: false,
            last_stats: Statistics::default(),
        })
    }

    /// Main entry point. Blocks until the search completes or is stopped;
    /// helper workers run concurrently over the shared tables.
    #[allow(clippy::too_many_arguments)]
    pub fn find_best_move(
        &mut self,
        board: &Position,
        kind: SearchType,
        time_limit: u64,
        xtra_time: u64,
        depth_limit: i32,
        background: bool,
        exclude: &[Move],
        include: &[Move],
    ) -> Move {
        let limits = match kind {
            SearchType::FixedDepth => Limits::FixedDepth(depth_limit.max(1)),
            SearchType::TimeLimit => Limits::Time(TimeManager::from_limits(time_limit, xtra_time)),
            SearchType::FixedTime => Limits::Time(TimeManager::from_limits(time_limit, 0)),
        };
        self.search_with_limits(board, limits, background, exclude, include)
    }

    /// Search with explicit limits (the UCI layer builds these directly).
    pub fn search_with_limits(
        &mut self,
        board: &Position,
        limits: Limits,
        background: bool,
        exclude: &[Move],
        include: &[Move],
    ) -> Move {
        self.stop.store(false, Ordering::SeqCst);
        self.background.store(background, Ordering::SeqCst);
        self.searching = true;
        self.tt.new_search();

        // Tablebase short-circuit at the root: a covered position needs no
        // search unless the caller restricted the move set.
        if exclude.is_empty() && include.is_empty() {
            if let Some((mv, score)) = syzygy::probe_root(board) {
                log::info!("syzygy root hit: {} score {}", mv.to_uci(), score);
                self.last_stats = Statistics {
                    depth: 1,
                    completed_depth: 1,
                    score,
                    best_move: mv,
                    pv: vec![mv],
                    tb_hits: 1,
                    ..Statistics::default()
                };
                if let Some(post) = self.post.lock().unwrap().as_mut() {
                    post(&self.last_stats);
                }
                self.searching = false;
                return mv;
            }
        }

        let shared = Arc::new(SharedState {
            tt: Arc::clone(&self.tt),
            history: Arc::clone(&self.history),
            params: Arc::clone(&self.params),
            stop: Arc::clone(&self.stop),
            nodes: AtomicU64::new(0),
            tb_hits: AtomicU64::new(0),
            bonus_time: AtomicI64::new(0),
            background: Arc::clone(&self.background),
            post: Arc::clone(&self.post),
            monitor: Arc::clone(&self.monitor),
            contempt: self.contempt,
            computer_side: board.side,
        });

        self.pool.start_helpers(board, &limits, &shared);

        let mut main = Search::new(board.clone(), limits, Arc::clone(&shared), 0);
        main.set_root_move_filter(exclude.to_vec(), include.to_vec());
        let main_stats = main.run();

        // The main thread finishing ends everyone's search.
        self.stop.store(true, Ordering::SeqCst);
        let helper_stats = self.pool.wait_helpers();

        self.last_stats = best_stats(main_stats, helper_stats);
        self.searching = false;
        self.background.store(false, Ordering::SeqCst);
        self.last_stats.best_move
    }

    /// Request cooperative termination; observed at the next node batch.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Clone of the stop flag, for callers that need to stop a search from
    /// another thread (the UCI reader does).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Clone of the background/ponder flag, cleared on "ponderhit" from a
    /// thread that cannot take the controller lock mid-search.
    pub fn background_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.background)
    }

    pub fn was_stopped(&self) -> bool {
        self.last_stats.stopped
    }

    pub fn searching(&self) -> bool {
        self.searching
    }

    pub fn pondering(&self) -> bool {
        self.searching && self.background.load(Ordering::Relaxed)
    }

    /// Clearing the background flag turns a ponder search into a normal
    /// timed search ("ponderhit").
    pub fn set_background(&self, value: bool) {
        self.background.store(value, Ordering::SeqCst);
    }

    pub fn set_contempt(&mut self, contempt: i32) {
        self.contempt = contempt;
    }

    pub fn contempt(&self) -> i32 {
        self.contempt
    }

    /// Draw score from the mover's perspective: a draw is bad for us and
    /// good for the opponent by `contempt` centipawns.
    pub fn draw_score(&self, board: &Position, computer_side: usize) -> i32 {
        if self.contempt == 0 {
            0
        } else if board.side == computer_side {
            -self.contempt
        } else {
            self.contempt
        }
    }

    /// Never call while searching.
    pub fn set_thread_count(&mut self, threads: usize) {
        debug_assert!(!self.searching);
        self.pool.set_thread_count(threads);
    }

    pub fn thread_count(&self) -> usize {
        self.pool.helper_count() + 1
    }

    /// Teardown + realloc of the shared table. Never call while searching.
    pub fn resize_hash(&mut self, mb: usize) -> Result<(), TableError> {
        debug_assert!(!self.searching);
        match Arc::get_mut(&mut self.tt) {
            Some(table) => table.resize(mb),
            None => {
                self.tt = Arc::new(TranspositionTable::new(mb)?);
                Ok(())
            }
        }
    }

    pub fn hash_size_mb(&self) -> usize {
        self.tt.size_mb()
    }

    pub fn clear_hash_tables(&self) {
        self.tt.clear();
        self.history.clear();
    }

    pub fn set_params(&mut self, params: SearchParams) {
        self.params = Arc::new(params);
    }

    /// Install a per-iteration status callback; returns the previous one.
    pub fn register_post_function(&self, post: Option<PostFunction>) -> Option<PostFunction> {
        std::mem::replace(&mut *self.post.lock().unwrap(), post)
    }

    /// Install a periodic monitor; a nonzero return requests termination.
    /// Returns the previous monitor.
    pub fn register_monitor_function(
        &self,
        monitor: Option<MonitorFunction>,
    ) -> Option<MonitorFunction> {
        std::mem::replace(&mut *self.monitor.lock().unwrap(), monitor)
    }

    pub fn last_stats(&self) -> &Statistics {
        &self.last_stats
    }

    pub fn hashfull(&self) -> usize {
        self.tt.hashfull()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Position, WHITE};

    fn init() {
        crate::zobrist::init_zobrist();
        crate::bitboard::init_attack_tables();
        crate::movegen::init_move_tables();
    }

    #[test]
    fn fixed_depth_search_returns_a_legal_move() {
        init();
        let mut ctrl = SearchController::new(8, 1).unwrap();
        let mut board = Position::startpos();
        let mv = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 6, false, &[], &[]);
        assert!(!mv.is_null());
        assert!(board.pseudo_legal(mv));
        assert!(board.is_legal(mv));
        assert!(ctrl.last_stats().completed_depth >= 6);
    }

    #[test]
    fn clearing_tables_keeps_results_reproducible() {
        init();
        let mut ctrl = SearchController::new(8, 1).unwrap();
        let board =
            Position::from_fen("r2qkbnr/ppp2ppp/2np4/4p3/2B1P1b1/5N2/PPPP1PPP/RNBQ1RK1 w kq - 0 5")
                .unwrap();
        ctrl.clear_hash_tables();
        let first = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 6, false, &[], &[]);
        let first_score = ctrl.last_stats().score;
        ctrl.clear_hash_tables();
        let second = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 6, false, &[], &[]);
        assert_eq!(first, second);
        assert_eq!(first_score, ctrl.last_stats().score);
    }

    #[test]
    fn exclude_filter_removes_the_obvious_move() {
        init();
        let mut ctrl = SearchController::new(8, 1).unwrap();
        let board = Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let best = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 5, false, &[], &[]);
        assert_eq!(best.to_uci(), "e4d5");
        let second = ctrl.find_best_move(
            &board,
            SearchType::FixedDepth,
            0,
            0,
            5,
            false,
            &[best],
            &[],
        );
        assert_ne!(second, best);
        assert!(!second.is_null());
    }

    #[test]
    fn monitor_can_terminate_the_search() {
        init();
        let mut ctrl = SearchController::new(8, 1).unwrap();
        ctrl.register_monitor_function(Some(Box::new(|_stats| 1)));
        let board = Position::startpos();
        let mv = ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 30, false, &[], &[]);
        // Terminated almost immediately, but still produces some move.
        assert!(!mv.is_null());
        assert!(ctrl.last_stats().completed_depth < 30);
        ctrl.register_monitor_function(None);
    }

    #[test]
    fn contempt_shifts_the_draw_score() {
        init();
        let mut ctrl = SearchController::new(1, 1).unwrap();
        ctrl.set_contempt(20);
        let board = Position::startpos();
        assert_eq!(ctrl.draw_score(&board, WHITE), -20);
        assert_eq!(ctrl.draw_score(&board, crate::board::BLACK), 20);
    }

    #[test]
    fn post_function_fires_every_iteration() {
        init();
        use std::sync::atomic::AtomicUsize;
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut ctrl = SearchController::new(8, 1).unwrap();
        ctrl.register_post_function(Some(Box::new(move |_stats| {
            counter.fetch_add(1, Ordering::Relaxed);
        })));
        let board = Position::startpos();
        ctrl.find_best_move(&board, SearchType::FixedDepth, 0, 0, 5, false, &[], &[]);
        assert!(count.load(Ordering::Relaxed) >= 5);
        ctrl.register_post_function(None);
    }

    #[test]
    fn two_workers_agree_with_one_on_a_tactic() {
        init();
        let fen = "4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1";
        let board = Position::from_fen(fen).unwrap();

        let mut single = SearchController::new(8, 1).unwrap();
        let a = single.find_best_move(&board, SearchType::FixedDepth, 0, 0, 7, false, &[], &[]);

        let mut double = SearchController::new(8, 2).unwrap();
        let b = double.find_best_move(&board, SearchType::FixedDepth, 0, 0, 7, false, &[], &[]);

        assert_eq!(a.to_uci(), b.to_uci());
    }
}
