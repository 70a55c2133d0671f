//! Pixel-wise complexity: Sobel gradient magnitude of the luma channel.
//!
//! - Luma conversion through `image`, optional 3×3 median blur (imageproc)
//!   to keep sensor noise from reading as detail.
//! - imageproc's 3×3 Sobel pair (integer, border clamped); the magnitude is
//!   scaled by 0.25/255 so a unit step edge in [0,1] intensity responds with 1.0.
//! - Tile quality is the mean response inside the tile.
//!
//! Complexity: O(W·H) per image; memory: one f32 per pixel.

use image::{DynamicImage, ImageBuffer, Luma};
use imageproc::filter::median_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use ndarray::Array2;
use tile_search::{ScoreField, TileCandidate};

use super::{crop, ComplexityScorer, ScoreState, TileScore};
use crate::config::ScorerKind;
use crate::error::{TileError, TileResult};

type Gradient = ImageBuffer<Luma<i16>, Vec<i16>>;

/// Sobel response of a unit step edge, in 8-bit intensity units.
const SOBEL_NORM: f32 = 4.0 * 255.0;

#[derive(Clone, Copy, Debug, Default)]
pub struct PixelwiseScorer {
    /// Median-blur the luma channel before taking gradients.
    pub denoise: bool,
}

impl PixelwiseScorer {
    pub fn new(denoise: bool) -> Self {
        Self { denoise }
    }

    /// Per-pixel edge response, indexed `(y, x)`.
    pub fn edge_response(&self, image: &DynamicImage) -> Array2<f32> {
        let mut luma = image.to_luma8();
        if self.denoise {
            luma = median_filter(&luma, 1, 1);
        }
        let grad_x = horizontal_sobel(&luma);
        let grad_y = vertical_sobel(&luma);
        sobel_magnitude(&grad_x, &grad_y)
    }
}

fn sobel_magnitude(grad_x: &Gradient, grad_y: &Gradient) -> Array2<f32> {
    let (w, h) = (grad_x.width() as usize, grad_x.height() as usize);
    let magnitude: Vec<f32> = grad_x
        .as_raw()
        .iter()
        .zip(grad_y.as_raw())
        .map(|(&gx, &gy)| {
            let (gx, gy) = (f32::from(gx), f32::from(gy));
            (gx * gx + gy * gy).sqrt() / SOBEL_NORM
        })
        .collect();
    Array2::from_shape_vec((h, w), magnitude).unwrap_or_else(|_| Array2::zeros((h, w)))
}

impl ComplexityScorer for PixelwiseScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Pixelwise
    }

    fn score(&mut self, image: &DynamicImage) -> TileResult<ScoreState> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TileError::inference(self.kind().as_str(), "empty image"));
        }
        Ok(ScoreState::new(ScoreField::new(self.edge_response(image), 1)))
    }

    fn score_tile(
        &mut self,
        image: &DynamicImage,
        state: &mut ScoreState,
        candidate: TileCandidate,
    ) -> TileResult<TileScore> {
        let (row, col, size) = (
            candidate.top_y as usize,
            candidate.top_x as usize,
            candidate.size as usize,
        );
        let quality = state
            .field
            .window_mean(row, col, size, size)
            .unwrap_or(0.0)
            .max(0.0);
        state.field.invalidate(row, col, size, size);
        Ok(TileScore {
            pixels: crop(image, &candidate),
            quality,
        })
    }
}
