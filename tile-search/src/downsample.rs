// SPDX-License-Identifier: MIT
//! # Downsampled Search
//!
//! Resolution-scaling wrapper around [`TileSelector`] for the pixel-wise
//! scorer on very large images.
//!
//! ## Flow
//!
//! 1. Area-reduce the score field by `scale` (bilinear, via fast_image_resize)
//! 2. Search the reduced field with a `⌈tile/scale⌉` window
//! 3. Multiply the winning position by `scale` to address the original field
//!
//! The reduced copy is throwaway: it is rebuilt for every query, and the
//! caller invalidates the ORIGINAL field so the next iteration sees the
//! spent region. A reduced cell whose `scale×scale` source block contains a
//! sentinel becomes a sentinel itself, so partially spent blocks are never
//! re-selected.
//!
//! The reduced window is rounded up so its source footprint always contains
//! the full `tile` window it maps back to. When the reduced field is too
//! small for that window the original field is searched directly.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::F32;
use fir::{ResizeAlg, ResizeOptions, Resizer};
use ndarray::Array2;

use crate::error::SearchError;
use crate::field::{FieldWindow, ScoreField, SENTINEL};
use crate::selector::TileSelector;

/// Reduce a field by an integer factor with bilinear resampling.
///
/// Output is `⌊rows/scale⌋ × ⌊cols/scale⌋` cells; the granularity is
/// multiplied by `scale`.
pub fn reduce_field(
    resizer: &mut Resizer,
    field: &ScoreField,
    scale: u32,
) -> Result<ScoreField, SearchError> {
    if scale == 0 {
        return Err(SearchError::InvalidScale(scale));
    }
    if scale == 1 {
        return Ok(field.clone());
    }
    let s = scale as usize;
    let (rows, cols) = (field.rows(), field.cols());
    let (out_rows, out_cols) = (rows / s, cols / s);
    if out_rows == 0 || out_cols == 0 {
        return Err(SearchError::FieldTooSmall {
            rows,
            cols,
            scale,
        });
    }

    // Spent cells resample as zero; the spent mask below restores the sentinel.
    let src: Vec<F32> = field
        .values()
        .iter()
        .map(|&v| F32::new(v.max(0.0)))
        .collect();
    let src_view = TypedImageRef::<F32>::new(cols as u32, rows as u32, &src)?;
    let mut dst = TypedImage::<F32>::new(out_cols as u32, out_rows as u32);
    let opts = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(fir::FilterType::Bilinear));
    resizer.resize_typed::<F32>(&src_view, &mut dst, &opts)?;

    let mut reduced = Array2::<f32>::zeros((out_rows, out_cols));
    for (dst_px, out) in dst.pixels().iter().zip(reduced.iter_mut()) {
        *out = dst_px.0.max(0.0);
    }

    let values = field.values();
    for r in 0..out_rows {
        for c in 0..out_cols {
            let block = values.slice(ndarray::s![r * s..(r + 1) * s, c * s..(c + 1) * s]);
            if block.iter().any(|&v| v <= SENTINEL) {
                reduced[[r, c]] = SENTINEL;
            }
        }
    }

    Ok(ScoreField::new(reduced, field.granularity() * scale))
}

/// Selector that searches a reduced copy of the field.
pub struct DownsampledSearch {
    scale: u32,
    tile_cells: usize,
    resizer: Resizer,
}

impl DownsampledSearch {
    /// `tile_cells` is the tile side in ORIGINAL field cells.
    pub fn new(tile_cells: usize, scale: u32) -> Result<Self, SearchError> {
        if scale == 0 {
            return Err(SearchError::InvalidScale(scale));
        }
        if tile_cells / scale as usize == 0 {
            return Err(SearchError::TileSmallerThanScale { tile_cells, scale });
        }
        Ok(Self {
            scale,
            tile_cells,
            resizer: Resizer::new(),
        })
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Window side searched in the reduced field.
    pub fn reduced_tile_cells(&self) -> usize {
        self.tile_cells.div_ceil(self.scale as usize)
    }

    /// Best window in ORIGINAL field cells, or `None` when nothing is left.
    ///
    /// The returned window always spans `tile_cells` original cells and is
    /// clamped to fit inside the field.
    pub fn locate(&mut self, field: &ScoreField) -> Result<Option<FieldWindow>, SearchError> {
        if field.rows() < self.tile_cells || field.cols() < self.tile_cells {
            return Ok(None);
        }
        let reduced = match reduce_field(&mut self.resizer, field, self.scale) {
            Ok(reduced) => reduced,
            Err(SearchError::FieldTooSmall { .. }) => return Ok(self.locate_native(field)),
            Err(e) => return Err(e),
        };
        let reduced_cells = self.reduced_tile_cells();
        if reduced.rows() < reduced_cells || reduced.cols() < reduced_cells {
            return Ok(self.locate_native(field));
        }
        let Some(win) = TileSelector::new(reduced_cells).select_best(&reduced) else {
            return Ok(None);
        };

        let s = self.scale as usize;
        let row = (win.row * s).min(field.rows() - self.tile_cells);
        let col = (win.col * s).min(field.cols() - self.tile_cells);
        if !field.window_is_clear(row, col, self.tile_cells, self.tile_cells) {
            return Ok(self.locate_native(field));
        }
        Ok(Some(FieldWindow {
            row,
            col,
            cells: self.tile_cells,
            sum: field.window_sum(row, col, self.tile_cells, self.tile_cells),
        }))
    }

    fn locate_native(&self, field: &ScoreField) -> Option<FieldWindow> {
        TileSelector::new(self.tile_cells).select_best(field)
    }
}
