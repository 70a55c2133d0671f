//! # Complexity Scoring
//!
//! Pluggable strategies that turn an image into a per-cell score field and
//! later score (and spend) the tile picked from it.
//!
//! ## Architecture
//!
//! - **ComplexityScorer Trait**: the single interface callers drive
//! - **PixelwiseScorer**: edge/gradient response per pixel (`G = 1`)
//! - **LearnedScorer**: opaque learned field at `G = 8` plus a regression head
//!
//! Callers never branch on which variant is active; the only place the
//! difference matters is the batch session's parallelism policy, which asks
//! [`ComplexityScorer::is_exclusive`] (or [`ScorerKind::is_exclusive`]).
//!
//! ## State
//!
//! [`ScoreState`] is created by [`ComplexityScorer::score`] once per image
//! and mutated in place by every [`ComplexityScorer::score_tile`] call for
//! that image. It is never shared across images.

use image::DynamicImage;
use tile_search::{FeatureTensor, ScoreField, TileCandidate};

use crate::config::ScorerKind;
use crate::error::TileResult;

pub mod learned;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pixelwise;

pub use learned::{ComplexityModel, LearnedScorer, ModelOutput};
#[cfg(feature = "onnx")]
pub use onnx::OnnxComplexityModel;
pub use pixelwise::PixelwiseScorer;

/// Per-image scoring state.
#[derive(Clone, Debug)]
pub struct ScoreState {
    pub field: ScoreField,
    /// Present only for the learned scorer.
    pub features: Option<FeatureTensor>,
}

impl ScoreState {
    pub fn new(field: ScoreField) -> Self {
        Self {
            field,
            features: None,
        }
    }

    pub fn with_features(field: ScoreField, features: FeatureTensor) -> Self {
        Self {
            field,
            features: Some(features),
        }
    }
}

/// An extracted tile and its scalar quality.
#[derive(Clone, Debug)]
pub struct TileScore {
    pub pixels: DynamicImage,
    pub quality: f32,
}

/// Strategy producing score fields and tile qualities.
///
/// Methods take `&mut self`: a scorer may own exclusive (device-resident)
/// state, and the batch session never drives one instance from two workers.
pub trait ComplexityScorer {
    fn kind(&self) -> ScorerKind;

    /// Pixel size of one field cell.
    fn granularity(&self) -> u32 {
        self.kind().granularity()
    }

    /// True when the scorer must only ever run on a single worker.
    fn is_exclusive(&self) -> bool {
        self.kind().is_exclusive()
    }

    /// Build the score field (and features) for a whole image.
    fn score(&mut self, image: &DynamicImage) -> TileResult<ScoreState>;

    /// Crop `candidate`, compute its quality and invalidate it in `state`.
    fn score_tile(
        &mut self,
        image: &DynamicImage,
        state: &mut ScoreState,
        candidate: TileCandidate,
    ) -> TileResult<TileScore>;
}

impl<S: ComplexityScorer + ?Sized> ComplexityScorer for Box<S> {
    fn kind(&self) -> ScorerKind {
        (**self).kind()
    }

    fn score(&mut self, image: &DynamicImage) -> TileResult<ScoreState> {
        (**self).score(image)
    }

    fn score_tile(
        &mut self,
        image: &DynamicImage,
        state: &mut ScoreState,
        candidate: TileCandidate,
    ) -> TileResult<TileScore> {
        (**self).score_tile(image, state, candidate)
    }
}

/// Copy the candidate's pixels out of the image.
pub(crate) fn crop(image: &DynamicImage, candidate: &TileCandidate) -> DynamicImage {
    image.crop_imm(candidate.top_x, candidate.top_y, candidate.size, candidate.size)
}
