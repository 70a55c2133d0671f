// SPDX-License-Identifier: MIT
//! # Score Fields and Tile Candidates
//!
//! A [`ScoreField`] is a 2-D scalar map aligned to image coordinates at a fixed
//! cell granularity `G`: one cell covers a `G×G` pixel block. The pixel-wise
//! scorer produces `G = 1`, the learned scorer `G = 8`.
//!
//! ## Invalidation
//!
//! Selected regions are overwritten with [`SENTINEL`], which is strictly lower
//! than any legitimate score (scores are `>= 0`). Invalidation is monotonic: a
//! sentinel cell is never turned back into a score, and the selector never
//! returns a window that covers one.
//!
//! ## Lifetime
//!
//! A field (and its optional [`FeatureTensor`]) is created once per image,
//! mutated in place across successive extractions from that image and dropped
//! with the image's job. Fields are never shared between images.

use ndarray::{s, Array2, Array3, ArrayView3};

/// Value written into spent cells.
pub const SENTINEL: f32 = -1.0;

/// Per-cell complexity scores at a fixed granularity.
#[derive(Clone, Debug)]
pub struct ScoreField {
    values: Array2<f32>,
    granularity: u32,
}

impl ScoreField {
    /// Wrap a `(rows, cols)` array of scores.
    ///
    /// # Panics
    /// Panics if `granularity` is zero.
    pub fn new(values: Array2<f32>, granularity: u32) -> Self {
        assert!(granularity > 0, "granularity must be positive");
        Self {
            values,
            granularity,
        }
    }

    /// Number of cell rows.
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of cell columns.
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// Pixel size of one cell side.
    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.values.get((row, col)).copied()
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Sum of the scores inside a window, sentinels included.
    pub fn window_sum(&self, row: usize, col: usize, rows: usize, cols: usize) -> f32 {
        let (r1, c1) = self.clamp_end(row, col, rows, cols);
        if row >= r1 || col >= c1 {
            return 0.0;
        }
        self.values.slice(s![row..r1, col..c1]).sum()
    }

    /// Mean score inside a window, or `None` when the window is empty.
    pub fn window_mean(&self, row: usize, col: usize, rows: usize, cols: usize) -> Option<f32> {
        let (r1, c1) = self.clamp_end(row, col, rows, cols);
        if row >= r1 || col >= c1 {
            return None;
        }
        self.values.slice(s![row..r1, col..c1]).mean()
    }

    /// Overwrite a window with [`SENTINEL`]. The window is clamped to the field.
    pub fn invalidate(&mut self, row: usize, col: usize, rows: usize, cols: usize) {
        let (r1, c1) = self.clamp_end(row, col, rows, cols);
        if row >= r1 || col >= c1 {
            return;
        }
        self.values.slice_mut(s![row..r1, col..c1]).fill(SENTINEL);
    }

    /// Invalidate the cells covering a pixel-space rectangle.
    ///
    /// The rectangle is converted outward so every cell touched by the
    /// tile is spent, even when the tile is not aligned to the cell grid.
    pub fn invalidate_pixels(&mut self, top_y: u32, top_x: u32, size: u32) {
        let g = self.granularity;
        let r0 = (top_y / g) as usize;
        let c0 = (top_x / g) as usize;
        let r1 = (top_y + size).div_ceil(g) as usize;
        let c1 = (top_x + size).div_ceil(g) as usize;
        self.invalidate(r0, c0, r1.saturating_sub(r0), c1.saturating_sub(c0));
    }

    /// True when the window lies inside the field and holds no spent cell.
    pub fn window_is_clear(&self, row: usize, col: usize, rows: usize, cols: usize) -> bool {
        if row + rows > self.rows() || col + cols > self.cols() {
            return false;
        }
        self.values
            .slice(s![row..row + rows, col..col + cols])
            .iter()
            .all(|&v| v > SENTINEL)
    }

    pub fn is_sentinel(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some_and(|v| v <= SENTINEL)
    }

    /// Count of cells that still carry a legitimate score.
    pub fn valid_cells(&self) -> usize {
        self.values.iter().filter(|&&v| v > SENTINEL).count()
    }

    /// True once every cell has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.valid_cells() == 0
    }

    fn clamp_end(&self, row: usize, col: usize, rows: usize, cols: usize) -> (usize, usize) {
        (
            row.saturating_add(rows).min(self.rows()),
            col.saturating_add(cols).min(self.cols()),
        )
    }
}

/// Auxiliary per-cell features produced alongside a learned [`ScoreField`].
///
/// Laid out as `(channels, rows, cols)` on the same cell grid as the field.
#[derive(Clone, Debug)]
pub struct FeatureTensor {
    values: Array3<f32>,
}

impl FeatureTensor {
    pub fn new(values: Array3<f32>) -> Self {
        Self { values }
    }

    pub fn channels(&self) -> usize {
        self.values.shape()[0]
    }

    pub fn rows(&self) -> usize {
        self.values.shape()[1]
    }

    pub fn cols(&self) -> usize {
        self.values.shape()[2]
    }

    /// Borrow the `cells×cells` block of every channel starting at `(row, col)`.
    pub fn slice(&self, row: usize, col: usize, cells: usize) -> ArrayView3<'_, f32> {
        let r1 = (row + cells).min(self.rows());
        let c1 = (col + cells).min(self.cols());
        self.values.slice(s![.., row..r1, col..c1])
    }
}

/// Window found by a search, in field cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldWindow {
    pub row: usize,
    pub col: usize,
    /// Side length in cells.
    pub cells: usize,
    /// Sum of the scores inside the window.
    pub sum: f32,
}

impl FieldWindow {
    /// Map to a full-resolution rectangle of side `tile_size`.
    ///
    /// `scale` is the extra downscale factor applied before the search
    /// (1 when the search ran on the native field).
    pub fn to_candidate(&self, granularity: u32, scale: u32, tile_size: u32) -> TileCandidate {
        TileCandidate {
            top_y: self.row as u32 * granularity * scale,
            top_x: self.col as u32 * granularity * scale,
            size: tile_size,
            score: self.sum,
        }
    }
}

/// A proposed or selected square tile in full-resolution pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileCandidate {
    pub top_y: u32,
    pub top_x: u32,
    pub size: u32,
    pub score: f32,
}

impl TileCandidate {
    /// Shift the rectangle so it lies inside a `height×width` image.
    pub fn clamp_to(mut self, height: u32, width: u32) -> Self {
        self.top_y = self.top_y.min(height.saturating_sub(self.size));
        self.top_x = self.top_x.min(width.saturating_sub(self.size));
        self
    }
}
