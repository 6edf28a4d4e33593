use std::time::Instant;

#[derive(Clone, Copy)]
pub enum TimeControl {
    Infinite,
    MoveTime(u64),
    GameTime {
        wtime: u64,
        btime: u64,
        winc: u64,
        binc: u64,
        moves_to_go: Option<u32>,
    },
}

/// Soft/hard deadline pair. The soft limit gates new iterations and is
/// scaled by root stability and the fail-high/low bonus; the hard limit
/// stops the search mid-tree.
#[derive(Clone, Copy)]
pub struct TimeManager {
    pub start_time: Instant,
    base_soft: u64,
    hard_limit: u64,
    pub xtra_time: u64,
    stability_factor: f64,
}

impl TimeManager {
    pub fn new(limit: TimeControl, side: usize, overhead: u64) -> Self {
        let (hard, soft, xtra) = match limit {
            TimeControl::Infinite => (u64::MAX, u64::MAX, 0),
            TimeControl::MoveTime(t) => {
                let effective = t.saturating_sub(overhead);
                let t = if effective == 0 { t } else { effective };
                (t, t, 0)
            }
            TimeControl::GameTime {
                wtime,
                btime,
                winc,
                binc,
                moves_to_go,
            } => {
                let (mut time, inc) = if side == 0 { (wtime, winc) } else { (btime, binc) };
                time = time.saturating_sub(overhead);
                if time == 0 {
                    time = 50;
                }

                let mtg = moves_to_go.unwrap_or(40).clamp(20, 50) as u64;
                let base = (time / mtg) + (inc * 3 / 4);
                let max_alloc = time * 8 / 10;

                let soft = base.min(max_alloc);
                let hard = (base * 2).min(max_alloc);
                (hard, soft, hard.saturating_sub(soft))
            }
        };

        Self {
            start_time: Instant::now(),
            base_soft: soft,
            hard_limit: hard,
            xtra_time: xtra,
            stability_factor: 1.0,
        }
    }

    /// Explicit limits, for the controller's TimeLimit/FixedTime searches.
    pub fn from_limits(time_limit: u64, xtra_time: u64) -> Self {
        Self {
            start_time: Instant::now(),
            base_soft: time_limit,
            hard_limit: time_limit.saturating_add(xtra_time),
            xtra_time,
            stability_factor: 1.0,
        }
    }

    pub fn infinite() -> Self {
        Self {
            start_time: Instant::now(),
            base_soft: u64::MAX,
            hard_limit: u64::MAX,
            xtra_time: 0,
            stability_factor: 1.0,
        }
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn set_stability_factor(&mut self, factor: f64) {
        self.stability_factor = factor;
    }

    fn soft_limit(&self, bonus_ms: i64) -> u64 {
        if self.base_soft == u64::MAX {
            return u64::MAX;
        }
        let scaled = (self.base_soft as f64 * self.stability_factor) as i64 + bonus_ms;
        let capped = scaled
            .max(self.base_soft as i64 / 4)
            .min(self.hard_limit as i64);
        capped.max(0) as u64
    }

    /// Would starting another iteration be pointless?
    #[inline(always)]
    pub fn soft_expired(&self, bonus_ms: i64) -> bool {
        self.elapsed_ms() >= self.soft_limit(bonus_ms)
    }

    /// Must the search stop right now?
    #[inline(always)]
    pub fn hard_expired(&self) -> bool {
        self.hard_limit != u64::MAX && self.elapsed_ms() >= self.hard_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_never_expires() {
        let tm = TimeManager::infinite();
        assert!(!tm.soft_expired(0));
        assert!(!tm.hard_expired());
    }

    #[test]
    fn game_time_allocates_a_fraction() {
        let tm = TimeManager::new(
            TimeControl::GameTime {
                wtime: 60_000,
                btime: 60_000,
                winc: 0,
                binc: 0,
                moves_to_go: None,
            },
            0,
            10,
        );
        // 40 moves to go: ~1.5s soft, ~3s hard.
        assert!(tm.base_soft >= 1000 && tm.base_soft <= 2000);
        assert!(tm.hard_limit <= 6000);
        assert!(!tm.soft_expired(0));
    }

    #[test]
    fn bonus_time_extends_the_soft_limit() {
        let mut tm = TimeManager::from_limits(100, 200);
        tm.set_stability_factor(1.0);
        // With a large negative bonus the limit collapses toward the floor.
        assert!(tm.soft_limit(-1000) <= 100);
        assert!(tm.soft_limit(150) > tm.soft_limit(0));
    }
}
