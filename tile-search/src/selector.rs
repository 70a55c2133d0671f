// SPDX-License-Identifier: MIT
//! # Greedy Sliding-Window Tile Selection
//!
//! Finds the tile-sized window of a [`ScoreField`] whose score sum is highest.
//!
//! ## Search Grid
//!
//! Candidate top-left corners lie on a grid with stride `tile/2` (in field
//! cells), covering rows `0..=rows-tile` and columns `0..=cols-tile`. Every
//! position of the field is therefore covered by at least half of some
//! candidate window.
//!
//! ## Scoring
//!
//! - Window sums come from a summed-area table built once per query, so each
//!   candidate costs O(1) regardless of the tile size.
//! - A window covering any sentinel cell is not a candidate.
//! - The running maximum starts at [`SENTINEL`]; a fully spent field returns
//!   `None` (the "no candidate" signal the planner stops on).
//!
//! ## Tie-break
//!
//! Candidates are visited row-major (y ascending, then x ascending) and only a
//! strictly greater sum replaces the current best, so among equal sums the
//! first window in scan order wins.

use crate::field::{FieldWindow, ScoreField, SENTINEL};

/// Sliding-window selector for one tile size.
#[derive(Clone, Copy, Debug)]
pub struct TileSelector {
    tile_cells: usize,
    stride: usize,
}

impl TileSelector {
    /// Create a selector for square windows of `tile_cells` field cells.
    ///
    /// # Panics
    /// Panics if `tile_cells` is zero.
    pub fn new(tile_cells: usize) -> Self {
        assert!(tile_cells > 0, "tile must cover at least one cell");
        Self {
            tile_cells,
            stride: (tile_cells / 2).max(1),
        }
    }

    pub fn tile_cells(&self) -> usize {
        self.tile_cells
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Top-left offsets along an axis of `len` cells.
    pub fn candidate_positions(&self, len: usize) -> Vec<usize> {
        if len < self.tile_cells {
            return Vec::new();
        }
        (0..=len - self.tile_cells).step_by(self.stride).collect()
    }

    /// Best non-invalidated window, or `None` when nothing is left to select.
    pub fn select_best(&self, field: &ScoreField) -> Option<FieldWindow> {
        let rows = self.candidate_positions(field.rows());
        let cols = self.candidate_positions(field.cols());
        if rows.is_empty() || cols.is_empty() {
            return None;
        }

        let table = WindowTable::build(field);
        let mut best: Option<FieldWindow> = None;
        let mut best_sum = SENTINEL;

        for &row in &rows {
            for &col in &cols {
                if table.spent_cells(row, col, self.tile_cells) > 0 {
                    continue;
                }
                let sum = table.sum(row, col, self.tile_cells);
                if sum > best_sum {
                    best_sum = sum;
                    best = Some(FieldWindow {
                        row,
                        col,
                        cells: self.tile_cells,
                        sum,
                    });
                }
            }
        }
        best
    }
}

/// Summed-area tables for scores and spent cells.
struct WindowTable {
    stride: usize,
    sums: Vec<f64>,
    spent: Vec<u32>,
}

impl WindowTable {
    fn build(field: &ScoreField) -> Self {
        let (h, w) = (field.rows(), field.cols());
        let stride = w + 1;
        let mut sums = vec![0.0f64; (h + 1) * stride];
        let mut spent = vec![0u32; (h + 1) * stride];

        for (r, row) in field.values().rows().into_iter().enumerate() {
            let mut run_sum = 0.0f64;
            let mut run_spent = 0u32;
            for (c, &v) in row.iter().enumerate() {
                if v <= SENTINEL {
                    run_spent += 1;
                } else {
                    run_sum += f64::from(v);
                }
                let idx = (r + 1) * stride + c + 1;
                sums[idx] = sums[r * stride + c + 1] + run_sum;
                spent[idx] = spent[r * stride + c + 1] + run_spent;
            }
        }

        Self { stride, sums, spent }
    }

    #[inline]
    fn corners(&self, row: usize, col: usize, size: usize) -> [usize; 4] {
        let s = self.stride;
        [
            row * s + col,
            row * s + col + size,
            (row + size) * s + col,
            (row + size) * s + col + size,
        ]
    }

    fn sum(&self, row: usize, col: usize, size: usize) -> f32 {
        let [a, b, c, d] = self.corners(row, col, size);
        (self.sums[d] - self.sums[b] - self.sums[c] + self.sums[a]) as f32
    }

    fn spent_cells(&self, row: usize, col: usize, size: usize) -> u32 {
        let [a, b, c, d] = self.corners(row, col, size);
        self.spent[d] + self.spent[a] - self.spent[b] - self.spent[c]
    }
}
