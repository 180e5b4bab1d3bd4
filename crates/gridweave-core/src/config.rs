//! Engine configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ROWS: usize = 1000;
pub const DEFAULT_MAX_COLS: usize = 26;
pub const DEFAULT_MAX_RECALC_ITERATIONS: usize = 50;

/// Grid extents: valid coordinates are `[0, max_rows) x [0, max_cols)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridBounds {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for GridBounds {
    fn default() -> Self {
        GridBounds {
            max_rows: DEFAULT_MAX_ROWS,
            max_cols: DEFAULT_MAX_COLS,
        }
    }
}

/// Tunables owned by a [`Document`](crate::Document).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_rows: usize,
    pub max_cols: usize,
    /// Cap on recalculation passes; the only guard against formula cycles.
    pub max_recalc_iterations: usize,
}

impl EngineConfig {
    pub fn bounds(&self) -> GridBounds {
        GridBounds {
            max_rows: self.max_rows,
            max_cols: self.max_cols,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_rows: DEFAULT_MAX_ROWS,
            max_cols: DEFAULT_MAX_COLS,
            max_recalc_iterations: DEFAULT_MAX_RECALC_ITERATIONS,
        }
    }
}
