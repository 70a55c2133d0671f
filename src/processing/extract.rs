//! # Per-Image Tile Extraction
//!
//! Runs one [`TilingJob`] against one image:
//!
//! 1. **Plan**: [`TileCountPlanner`] decides pass-through, one tile or a
//!    dynamic budget from the image dimensions.
//! 2. **Score**: the scorer builds the image's [`ScoreState`](crate::scoring::ScoreState).
//! 3. **Search**: [`TileSelector`] (or [`DownsampledSearch`] when the
//!    pixel-wise scorer runs with `scale > 1`) proposes the best window.
//! 4. **Extract**: the scorer crops the tile, reports its quality and spends
//!    the window. A quality below the threshold ends the image.
//!
//! Steps 3 and 4 repeat until the budget is used or the field is exhausted.

use image::DynamicImage;
use tile_search::{DownsampledSearch, TileCandidate, TileCountPlanner, TilePlan, TileSelector};

use crate::config::{ScorerKind, TilingJob};
use crate::error::{TileError, TileResult};
use crate::scoring::ComplexityScorer;

/// A tile accepted for writing.
#[derive(Clone, Debug)]
pub struct ExtractedTile {
    /// Full-resolution rectangle; `score` is the window sum that won the search.
    pub candidate: TileCandidate,
    pub quality: f32,
    pub image: DynamicImage,
}

/// Result of one image's job.
#[derive(Clone, Debug)]
pub enum ImageTiles {
    /// Image smaller than a tile in some dimension, returned unmodified.
    PassThrough(DynamicImage),
    /// Accepted tiles in extraction order. May be empty.
    Tiles(Vec<ExtractedTile>),
}

impl ImageTiles {
    pub fn tile_count(&self) -> usize {
        match self {
            ImageTiles::PassThrough(_) => 0,
            ImageTiles::Tiles(tiles) => tiles.len(),
        }
    }
}

enum Search {
    Native(TileSelector),
    Downsampled(DownsampledSearch),
}

/// Reusable per-worker extraction state for one job.
///
/// The downsampled search owns a resizer, so workers keep one extractor
/// across images instead of rebuilding it per image.
pub struct TileExtractor {
    job: TilingJob,
    planner: TileCountPlanner,
    search: Search,
}

impl TileExtractor {
    /// Build the extractor for `job`, searching at `granularity` pixels per cell.
    pub fn new(job: TilingJob, granularity: u32) -> TileResult<Self> {
        let tile_cells = (job.tile_size / granularity.max(1)) as usize;
        if tile_cells == 0 {
            return Err(TileError::config(
                "tile_size",
                job.tile_size.to_string(),
                format!("must cover at least one {} px score cell", granularity),
            ));
        }
        let search = if job.scorer == ScorerKind::Pixelwise && job.scale > 1 {
            Search::Downsampled(DownsampledSearch::new(tile_cells, job.scale)?)
        } else {
            Search::Native(TileSelector::new(tile_cells))
        };
        Ok(Self {
            job,
            planner: TileCountPlanner::new(job.tile_size, job.dynamic_tile_count, job.score_threshold),
            search,
        })
    }

    pub fn job(&self) -> &TilingJob {
        &self.job
    }

    /// Plan the tile budget for an image of `height×width` pixels.
    pub fn plan(&self, height: u32, width: u32) -> TilePlan {
        self.planner.plan(height, width)
    }

    /// Plan, score and extract the tiles of one image.
    pub fn extract<S>(&mut self, scorer: &mut S, image: DynamicImage) -> TileResult<ImageTiles>
    where
        S: ComplexityScorer + ?Sized,
    {
        let (width, height) = (image.width(), image.height());
        let tile_size = self.job.tile_size;

        let budget = match self.planner.plan(height, width) {
            TilePlan::PassThrough => {
                log::debug!(
                    "{}x{} image is smaller than a {} px tile, passing through",
                    width,
                    height,
                    tile_size
                );
                return Ok(ImageTiles::PassThrough(image));
            }
            plan => plan.budget(),
        };

        let mut state = scorer.score(&image)?;
        let mut tiles = Vec::with_capacity(budget as usize);

        if width == tile_size && height == tile_size {
            let candidate = TileCandidate {
                top_y: 0,
                top_x: 0,
                size: tile_size,
                score: state.field.window_sum(0, 0, state.field.rows(), state.field.cols()),
            };
            let scored = scorer.score_tile(&image, &mut state, candidate)?;
            if self.planner.accepts(scored.quality) {
                tiles.push(self.finish(candidate, scored.quality, scored.pixels));
            }
            return Ok(ImageTiles::Tiles(tiles));
        }

        for index in 0..budget {
            let window = match &mut self.search {
                Search::Native(selector) => selector.select_best(&state.field),
                Search::Downsampled(search) => search.locate(&state.field)?,
            };
            let Some(window) = window else {
                log::debug!("score field exhausted after {} of {} tiles", index, budget);
                break;
            };

            // Downsampled windows already come back in original field cells.
            let candidate = window
                .to_candidate(state.field.granularity(), 1, tile_size)
                .clamp_to(height, width);
            let scored = scorer.score_tile(&image, &mut state, candidate)?;
            if !self.planner.accepts(scored.quality) {
                log::debug!(
                    "tile {} quality {:.4} below threshold {:.4}, stopping",
                    index,
                    scored.quality,
                    self.job.score_threshold
                );
                break;
            }
            tiles.push(self.finish(candidate, scored.quality, scored.pixels));
        }

        Ok(ImageTiles::Tiles(tiles))
    }

    fn finish(&self, candidate: TileCandidate, quality: f32, pixels: DynamicImage) -> ExtractedTile {
        let image = if self.job.grayscale {
            DynamicImage::ImageLuma8(pixels.to_luma8())
        } else {
            pixels
        };
        ExtractedTile {
            candidate,
            quality,
            image,
        }
    }
}

/// One-shot helper: build an extractor for the scorer and run it.
pub fn extract_tiles<S>(scorer: &mut S, image: DynamicImage, job: &TilingJob) -> TileResult<ImageTiles>
where
    S: ComplexityScorer + ?Sized,
{
    let mut extractor = TileExtractor::new(*job, scorer.granularity())?;
    extractor.extract(scorer, image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::learned::tests::BlockMeanModel;
    use crate::scoring::{LearnedScorer, PixelwiseScorer};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn job(tile_size: u32) -> TilingJob {
        TilingJob {
            tile_size,
            scale: 1,
            dynamic_tile_count: false,
            score_threshold: 0.0,
            scorer: ScorerKind::Pixelwise,
            grayscale: false,
            denoise: false,
        }
    }

    /// Flat gray with a checkerboard patch of `patch` px at (`y`, `x`).
    fn patch_image(w: u32, h: u32, y: u32, x: u32, patch: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |px, py| {
            let inside = px >= x && px < x + patch && py >= y && py < y + patch;
            if inside && (px / 2 + py / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([40, 40, 40])
            }
        }))
    }

    fn tiles(result: ImageTiles) -> Vec<ExtractedTile> {
        match result {
            ImageTiles::Tiles(tiles) => tiles,
            ImageTiles::PassThrough(_) => panic!("unexpected pass-through"),
        }
    }

    #[test]
    fn test_small_image_passes_through_unchanged() {
        let img = patch_image(20, 64, 0, 0, 8);
        let result = extract_tiles(&mut PixelwiseScorer::default(), img.clone(), &job(32)).unwrap();
        match result {
            ImageTiles::PassThrough(out) => assert_eq!(out.as_bytes(), img.as_bytes()),
            ImageTiles::Tiles(_) => panic!("expected pass-through"),
        }
    }

    #[test]
    fn test_exact_size_image_is_the_tile() {
        let img = patch_image(32, 32, 4, 4, 8);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img.clone(), &job(32)).unwrap());
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].candidate.top_y, tiles[0].candidate.top_x), (0, 0));
        assert_eq!(tiles[0].image.as_bytes(), img.as_bytes());
    }

    #[test]
    fn test_single_tile_finds_detail() {
        let img = patch_image(64, 64, 32, 32, 16);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job(16)).unwrap());
        assert_eq!(tiles.len(), 1);
        let c = tiles[0].candidate;
        assert_eq!((c.top_y, c.top_x, c.size), (32, 32, 16));
        assert_eq!((tiles[0].image.width(), tiles[0].image.height()), (16, 16));
    }

    #[test]
    fn test_dynamic_tiles_do_not_overlap() {
        let mut job = job(16);
        job.dynamic_tile_count = true;
        let img = patch_image(64, 64, 8, 8, 40);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job).unwrap());

        // 4096 / (256 * 2) = 8 planned.
        assert!(!tiles.is_empty() && tiles.len() <= 8);
        for (i, a) in tiles.iter().enumerate() {
            assert_eq!((a.image.width(), a.image.height()), (16, 16));
            for b in &tiles[i + 1..] {
                let (a, b) = (a.candidate, b.candidate);
                let disjoint = a.top_x + a.size <= b.top_x
                    || b.top_x + b.size <= a.top_x
                    || a.top_y + a.size <= b.top_y
                    || b.top_y + b.size <= a.top_y;
                assert!(disjoint, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_threshold_stops_on_flat_remainder() {
        let mut job = job(16);
        job.dynamic_tile_count = true;
        job.score_threshold = 0.05;
        // Only one 16 px patch has detail; everything else is flat.
        let img = patch_image(64, 64, 0, 0, 16);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job).unwrap());
        assert_eq!(tiles.len(), 1);
        assert!(tiles[0].quality >= 0.05);
    }

    #[test]
    fn test_downsampled_search_extracts_full_size_tiles() {
        let mut job = job(16);
        job.scale = 2;
        let img = patch_image(64, 64, 32, 16, 16);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job).unwrap());
        assert_eq!(tiles.len(), 1);
        let c = tiles[0].candidate;
        assert_eq!(c.size, 16);
        assert_eq!((tiles[0].image.width(), tiles[0].image.height()), (16, 16));
        assert_eq!(c.top_y % 2, 0);
        assert_eq!(c.top_x % 2, 0);
        assert!(c.top_y >= 24 && c.top_y <= 40);
        assert!(c.top_x >= 8 && c.top_x <= 24);
    }

    #[test]
    fn test_downsampled_dynamic_tiles_are_disjoint() {
        let mut job = job(15);
        job.scale = 2;
        job.dynamic_tile_count = true;
        let img = patch_image(90, 90, 10, 10, 60);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job).unwrap());

        // 8100 / (225 * 2) = 18 planned.
        assert!(tiles.len() > 1);
        for (i, a) in tiles.iter().enumerate() {
            assert_eq!((a.image.width(), a.image.height()), (15, 15));
            for b in &tiles[i + 1..] {
                let (a, b) = (a.candidate, b.candidate);
                let disjoint = a.top_x + a.size <= b.top_x
                    || b.top_x + b.size <= a.top_x
                    || a.top_y + a.size <= b.top_y
                    || b.top_y + b.size <= a.top_y;
                assert!(disjoint, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_tile_smaller_than_score_cell_is_config_error() {
        let mut job = job(4);
        job.scorer = ScorerKind::Learned;
        let err = TileExtractor::new(job, 8).err().unwrap();
        assert!(err.is_fatal());
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_grayscale_tiles_have_one_channel() {
        let mut job = job(16);
        job.grayscale = true;
        let img = patch_image(64, 64, 0, 0, 16);
        let tiles = tiles(extract_tiles(&mut PixelwiseScorer::default(), img, &job).unwrap());
        assert_eq!(tiles[0].image.color().channel_count(), 1);
    }

    #[test]
    fn test_learned_scorer_tiles_align_to_cells() {
        let mut job = job(16);
        job.scorer = ScorerKind::Learned;
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
            if x >= 40 && y >= 24 { Luma([255]) } else { Luma([0]) }
        }));
        let mut scorer = LearnedScorer::new(Box::new(BlockMeanModel { pad: false }));
        let tiles = tiles(extract_tiles(&mut scorer, img, &job).unwrap());
        let c = tiles[0].candidate;
        assert_eq!(c.top_y % 8, 0);
        assert_eq!(c.top_x % 8, 0);
        assert!((tiles[0].quality - 1.0).abs() < 1e-6);
    }
}
