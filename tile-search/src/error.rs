// SPDX-License-Identifier: MIT
// Errors raised by the search machinery. Resampling errors from
// fast_image_resize are wrapped as-is.

use fast_image_resize as fir;

#[derive(Debug)]
pub enum SearchError {
    InvalidScale(u32),
    TileSmallerThanScale { tile_cells: usize, scale: u32 },
    FieldTooSmall { rows: usize, cols: usize, scale: u32 },
    Fir(fir::ResizeError),
    InvalidPixels(fir::InvalidPixelsSize),
}

impl From<fir::ResizeError> for SearchError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::InvalidPixelsSize> for SearchError { fn from(e: fir::InvalidPixelsSize) -> Self { Self::InvalidPixels(e) } }

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidScale(s) => write!(f, "Scale must be at least 1 (got {})", s),
            SearchError::TileSmallerThanScale { tile_cells, scale } => {
                write!(f, "Tile of {} cells vanishes at scale {}", tile_cells, scale)
            }
            SearchError::FieldTooSmall { rows, cols, scale } => {
                write!(f, "Field {}x{} cannot be reduced by {}", cols, rows, scale)
            }
            SearchError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            SearchError::InvalidPixels(e) => write!(f, "Invalid pixel buffer: {}", e),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Fir(e) => Some(e),
            SearchError::InvalidPixels(e) => Some(e),
            _ => None,
        }
    }
}
