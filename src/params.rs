use serde::{Deserialize, Serialize};
use std::io::Write;

fn default_lmr_table() -> [[u8; 64]; 64] {
    [[0; 64]; 64]
}

fn default_lmp_table() -> [[usize; 16]; 2] {
    LMP_DEFAULT
}

// [improving][depth]
const LMP_DEFAULT: [[usize; 16]; 2] = [
    [0, 2, 3, 5, 7, 10, 14, 19, 25, 32, 40, 49, 59, 70, 82, 95],
    [0, 3, 5, 8, 12, 17, 23, 30, 38, 47, 57, 68, 80, 93, 107, 122],
];

/// Tunable search constants. Serialized as JSON so parameter sweeps can
/// load candidate sets without a rebuild; the derived tables are rebuilt
/// after every load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchParams {
    // LMR
    pub lmr_base: f64,
    pub lmr_divisor: f64,

    // Null move
    pub nmp_min_depth: i32,
    pub nmp_base: i32,
    pub nmp_depth_divisor: i32,
    pub nmp_eval_divisor: i32,
    pub nmp_verify_depth: i32,

    // Reverse futility
    pub rfp_max_depth: i32,
    pub rfp_margin: i32,

    // Razoring
    pub razor_max_depth: i32,
    pub razor_base: i32,
    pub razor_multiplier: i32,

    // Futility
    pub futility_max_depth: i32,
    pub futility_margin: i32,

    // Late move pruning
    pub lmp_max_depth: i32,

    // SEE pruning
    pub see_prune_max_depth: i32,
    pub see_quiet_margin: i32,
    pub see_capture_margin: i32,

    // ProbCut
    pub probcut_min_depth: i32,
    pub probcut_margin: i32,
    pub probcut_reduction: i32,

    // Singular extensions
    pub singular_min_depth: i32,
    pub singular_margin_mult: i32,

    // Internal iterative deepening
    pub iid_min_depth: i32,
    pub iid_reduction: i32,

    // Aspiration windows
    pub aspiration_min_depth: i32,
    pub aspiration_window: i32,

    // Quiescence
    pub qsearch_delta: i32,

    #[serde(skip, default = "default_lmp_table")]
    pub lmp_table: [[usize; 16]; 2],

    #[serde(skip, default = "default_lmr_table")]
    pub lmr_table: [[u8; 64]; 64],
}

impl Default for SearchParams {
    fn default() -> Self {
        let mut params = Self {
            lmr_base: 1.0,
            lmr_divisor: 2.5,

            nmp_min_depth: 3,
            nmp_base: 3,
            nmp_depth_divisor: 6,
            nmp_eval_divisor: 200,
            nmp_verify_depth: 12,

            rfp_max_depth: 7,
            rfp_margin: 60,

            razor_max_depth: 3,
            razor_base: 300,
            razor_multiplier: 150,

            futility_max_depth: 5,
            futility_margin: 150,

            lmp_max_depth: 8,

            see_prune_max_depth: 8,
            see_quiet_margin: 80,
            see_capture_margin: 100,

            probcut_min_depth: 5,
            probcut_margin: 200,
            probcut_reduction: 4,

            singular_min_depth: 8,
            singular_margin_mult: 2,

            iid_min_depth: 5,
            iid_reduction: 2,

            aspiration_min_depth: 5,
            aspiration_window: 20,

            qsearch_delta: 975,

            lmp_table: LMP_DEFAULT,
            lmr_table: [[0; 64]; 64],
        };
        params.recalculate_tables();
        params
    }
}

impl SearchParams {
    pub fn recalculate_tables(&mut self) {
        for d in 0..64 {
            for m in 0..64 {
                if d > 2 && m > 2 {
                    let lmr =
                        self.lmr_base + (d as f64).ln() * (m as f64).ln() / self.lmr_divisor;
                    self.lmr_table[d][m] = lmr.max(0.0) as u8;
                } else {
                    self.lmr_table[d][m] = 0;
                }
            }
        }
    }

    #[inline(always)]
    pub fn lmr(&self, depth: i32, move_index: usize) -> i32 {
        let d = (depth.max(0) as usize).min(63);
        let m = move_index.min(63);
        self.lmr_table[d][m] as i32
    }

    #[inline(always)]
    pub fn lmp_count(&self, depth: i32, improving: bool) -> usize {
        let d = (depth.max(0) as usize).min(15);
        self.lmp_table[improving as usize][d]
    }

    #[inline(always)]
    pub fn razor_margin(&self, depth: i32) -> i32 {
        self.razor_base + depth * self.razor_multiplier
    }

    #[inline(always)]
    pub fn rfp_margin_at(&self, depth: i32) -> i32 {
        self.rfp_margin * depth
    }

    #[inline(always)]
    pub fn futility_margin_at(&self, depth: i32) -> i32 {
        self.futility_margin * depth
    }

    /// SEE pruning threshold: quiets are held to a flat bar per depth,
    /// captures to a steeper one.
    #[inline(always)]
    pub fn see_margin(&self, depth: i32, quiet: bool) -> i32 {
        if quiet {
            -self.see_quiet_margin * depth
        } else {
            -self.see_capture_margin * depth
        }
    }

    pub fn save_to_json(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load_from_json(path: &str) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut params: SearchParams = serde_json::from_reader(reader)?;
        params.recalculate_tables();
        params.lmp_table = LMP_DEFAULT;
        Ok(params)
    }
}
