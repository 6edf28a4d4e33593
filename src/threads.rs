use crate::board::Position;
use crate::search::{Limits, Search, SharedState, Statistics};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

const WORKER_STACK: usize = 16 * 1024 * 1024;

struct SearchJob {
    board: Position,
    limits: Limits,
    shared: Arc<SharedState>,
}

enum Job {
    Search(Box<SearchJob>),
    Quit,
}

struct Worker {
    job_tx: mpsc::Sender<Job>,
    result_rx: mpsc::Receiver<Statistics>,
    handle: Option<JoinHandle<()>>,
}

/// Pool of persistent helper workers. The caller's thread acts as worker 0;
/// helpers run the identical iterative-deepening loop with staggered depths
/// and stop cooperatively through the shared flag.
pub struct ThreadPool {
    workers: Vec<Worker>,
    in_flight: usize,
}

impl ThreadPool {
    pub fn new(threads: usize) -> Self {
        let mut pool = Self {
            workers: Vec::new(),
            in_flight: 0,
        };
        pool.set_thread_count(threads);
        pool
    }

    /// Resize the pool to `threads` total (including the main thread).
    /// Never call while a search is running.
    pub fn set_thread_count(&mut self, threads: usize) {
        let helpers = threads.saturating_sub(1);
        while self.workers.len() > helpers {
            let worker = self.workers.pop().expect("worker present");
            let _ = worker.job_tx.send(Job::Quit);
            if let Some(handle) = worker.handle {
                let _ = handle.join();
            }
        }
        while self.workers.len() < helpers {
            let id = self.workers.len() + 1;
            self.workers.push(Self::spawn_worker(id));
        }
    }

    fn spawn_worker(id: usize) -> Worker {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<Statistics>();

        let handle = std::thread::Builder::new()
            .name(format!("halcyon-worker-{}", id))
            .stack_size(WORKER_STACK)
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    match job {
                        Job::Search(job) => {
                            let mut search = Search::new(job.board, job.limits, job.shared, id);
                            let stats = search.run();
                            if result_tx.send(stats).is_err() {
                                break;
                            }
                        }
                        Job::Quit => break,
                    }
                }
            })
            .expect("spawn search worker");

        Worker {
            job_tx,
            result_rx,
            handle: Some(handle),
        }
    }

    pub fn helper_count(&self) -> usize {
        self.workers.len()
    }

    /// Hand every helper its own copy of the root position.
    pub fn start_helpers(&mut self, board: &Position, limits: &Limits, shared: &Arc<SharedState>) {
        self.in_flight = self.workers.len();
        for worker in &self.workers {
            let job = SearchJob {
                board: board.clone(),
                limits: limits.clone(),
                shared: Arc::clone(shared),
            };
            worker
                .job_tx
                .send(Job::Search(Box::new(job)))
                .expect("worker channel open");
        }
    }

    /// Block until every helper reports back. The stop flag must already be
    /// set (or the limits exhausted) or this will wait for full completion.
    pub fn wait_helpers(&mut self) -> Vec<Statistics> {
        let mut results = Vec::with_capacity(self.in_flight);
        for worker in self.workers.iter().take(self.in_flight) {
            if let Ok(stats) = worker.result_rx.recv() {
                results.push(stats);
            }
        }
        self.in_flight = 0;
        results
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.job_tx.send(Job::Quit);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Choose the thread whose last completed iteration is deepest; ties go to
/// the better score. Mate scores win outright so a found mate is never
/// discarded for depth.
pub fn best_stats(main: Statistics, helpers: Vec<Statistics>) -> Statistics {
    let mut best = main;
    for cand in helpers {
        if cand.best_move.is_null() {
            continue;
        }
        let deeper = cand.completed_depth > best.completed_depth;
        let better = cand.completed_depth == best.completed_depth && cand.score > best.score;
        let mate_found =
            crate::eval::is_mate_score(cand.score) && cand.score > best.score;
        if best.best_move.is_null() || deeper || better || mate_found {
            best = cand;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::Move;

    fn stats(depth: i32, score: i32, mv: u32) -> Statistics {
        Statistics {
            completed_depth: depth,
            score,
            best_move: Move(mv),
            ..Statistics::default()
        }
    }

    #[test]
    fn deeper_thread_wins() {
        let main = stats(10, 50, 1);
        let helper = stats(12, 30, 2);
        assert_eq!(best_stats(main, vec![helper]).best_move, Move(2));
    }

    #[test]
    fn equal_depth_better_score_wins() {
        let main = stats(10, 50, 1);
        let helper = stats(10, 80, 2);
        assert_eq!(best_stats(main, vec![helper]).best_move, Move(2));
    }

    #[test]
    fn moveless_helper_is_ignored() {
        let main = stats(10, 50, 1);
        let helper = stats(14, 500, 0);
        assert_eq!(best_stats(main, vec![helper]).best_move, Move(1));
    }

    #[test]
    fn pool_spawns_and_resizes() {
        let mut pool = ThreadPool::new(4);
        assert_eq!(pool.helper_count(), 3);
        pool.set_thread_count(2);
        assert_eq!(pool.helper_count(), 1);
        pool.set_thread_count(1);
        assert_eq!(pool.helper_count(), 0);
    }
}
