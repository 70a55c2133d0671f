//! # Learned Complexity Scorer
//!
//! Wraps an opaque [`ComplexityModel`] bound once per process. The model sees
//! a normalized CHW tensor and returns a coarse complexity field (one cell per
//! 8×8 pixel block) plus a fused feature tensor on the same grid. Tile quality
//! comes from feeding the tile's feature slice through the model's regression
//! head.
//!
//! The model's weights and device memory are owned exclusively by the scorer.
//! The batch session only ever creates one worker when this scorer is active,
//! so no locking happens here.

use image::DynamicImage;
use ndarray::{Array2, Array3, ArrayView3};
use tile_search::{FeatureTensor, ScoreField, TileCandidate};

use super::{crop, ComplexityScorer, ScoreState, TileScore};
use crate::config::ScorerKind;
use crate::error::{TileError, TileResult};

/// Pixel size of one learned field cell.
pub const LEARNED_CELL: u32 = 8;

/// Raw output of a model forward pass.
#[derive(Clone, Debug)]
pub struct ModelOutput {
    /// `(rows, cols)` complexity field.
    pub field: Array2<f32>,
    /// `(channels, rows, cols)` features aligned with `field`.
    pub features: Array3<f32>,
}

/// Opaque learned capability: any inference runtime can sit behind it.
pub trait ComplexityModel: Send {
    /// Forward pass over a `(3, H, W)` tensor with values in [0,1].
    fn infer(&mut self, image: ArrayView3<'_, f32>) -> TileResult<ModelOutput>;

    /// Regression head over a `(channels, cells, cells)` feature slice.
    fn regress(&mut self, features: ArrayView3<'_, f32>) -> TileResult<f32>;
}

pub struct LearnedScorer {
    model: Box<dyn ComplexityModel>,
}

impl LearnedScorer {
    pub fn new(model: Box<dyn ComplexityModel>) -> Self {
        Self { model }
    }

    fn fail(&self, reason: impl Into<String>) -> TileError {
        TileError::inference(ScorerKind::Learned.as_str(), reason)
    }
}

/// Normalized `(3, H, W)` tensor of an image.
pub fn to_chw_tensor(image: &DynamicImage) -> Array3<f32> {
    let rgb = image.to_rgb32f();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    Array3::from_shape_fn((3, h, w), |(c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[c].clamp(0.0, 1.0)
    })
}

impl ComplexityScorer for LearnedScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Learned
    }

    fn score(&mut self, image: &DynamicImage) -> TileResult<ScoreState> {
        let rows = (image.height() / LEARNED_CELL) as usize;
        let cols = (image.width() / LEARNED_CELL) as usize;
        if rows == 0 || cols == 0 {
            return Err(self.fail("image smaller than one field cell"));
        }

        let tensor = to_chw_tensor(image);
        let output = self.model.infer(tensor.view())?;

        // Models that pad to the next cell return one extra row/column.
        let (fr, fc) = output.field.dim();
        if fr < rows || fc < cols {
            return Err(self.fail(format!(
                "malformed field shape {}x{}, expected at least {}x{}",
                fr, fc, rows, cols
            )));
        }
        let (_, tr, tc) = output.features.dim();
        if tr != fr || tc != fc {
            return Err(self.fail(format!(
                "feature grid {}x{} does not match field {}x{}",
                tr, tc, fr, fc
            )));
        }

        let field = output
            .field
            .slice(ndarray::s![..rows, ..cols])
            .mapv(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
        let features = output
            .features
            .slice(ndarray::s![.., ..rows, ..cols])
            .to_owned();

        Ok(ScoreState::with_features(
            ScoreField::new(field, LEARNED_CELL),
            FeatureTensor::new(features),
        ))
    }

    fn score_tile(
        &mut self,
        image: &DynamicImage,
        state: &mut ScoreState,
        candidate: TileCandidate,
    ) -> TileResult<TileScore> {
        let Some(features) = state.features.as_ref() else {
            return Err(self.fail("score state carries no feature tensor"));
        };
        let row = (candidate.top_y / LEARNED_CELL) as usize;
        let col = (candidate.top_x / LEARNED_CELL) as usize;
        let cells = (candidate.size / LEARNED_CELL) as usize;

        let quality = self.model.regress(features.slice(row, col, cells))?;
        if !quality.is_finite() {
            return Err(self.fail(format!("regression head returned {}", quality)));
        }

        state
            .field
            .invalidate_pixels(candidate.top_y, candidate.top_x, candidate.size);
        Ok(TileScore {
            pixels: crop(image, &candidate),
            quality: quality.clamp(0.0, 1.0),
        })
    }
}
