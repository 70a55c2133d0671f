//! # Configuration Module
//!
//! Configuration structures and validation for tile extraction runs. It is
//! the common interface between the CLI and the library: the CLI fills a
//! [`TilingConfig`], the library validates it once and derives an immutable
//! per-image [`TilingJob`] from it.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Range | Description |
//! |-----------|------|-------|-------------|
//! | `in_folder` | `PathBuf` | existing folder | Source images |
//! | `out_folder` | `PathBuf` | any folder | Tile destination (created on demand) |
//! | `tile_size` | `u32` | > 0, multiple of the scorer granularity | Tile side in pixels |
//! | `scale` | `u32` | >= 1, <= `tile_size` | Extra search downscale (pixel-wise only) |
//! | `process_mode` | `ProcessMode` | thread/process/sequential | Batch parallelism |
//! | `dynamic_tile_count` | `bool` | | Extract several tiles from large images |
//! | `score_threshold` | `f32` | >= 0, 0 disables | Minimum tile quality |
//! | `grayscale` | `bool` | | Write single-channel tiles |
//! | `scorer` | `ScorerKind` | pixelwise/learned | Complexity scorer |
//! | `workers` | `Option<usize>` | >= 1 | Pool size (defaults to available cores) |
//! | `denoise` | `bool` | | Median blur before the pixel-wise edge response |
//! | `backbone_model`, `head_model` | `Option<PathBuf>` | ONNX files | Learned scorer weights |
//!
//! ## Examples
//!
//! ```rust
//! use complexity_tiler::config::config::{ScorerKind, TilingConfig};
//!
//! let mut config = TilingConfig::default();
//! config.tile_size = 256;
//! config.dynamic_tile_count = true;
//! assert!(config.validate().is_ok());
//!
//! let job = config.to_tiling_job();
//! assert_eq!(job.tile_size, 256);
//! assert_eq!(job.scorer, ScorerKind::Pixelwise);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// How the batch session spreads images over workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// OS thread pool inside this process
    Thread,
    /// Pool of child processes, one image per child
    Process,
    /// One image at a time on the calling thread
    Sequential,
}

impl fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessMode::Thread => "thread",
            ProcessMode::Process => "process",
            ProcessMode::Sequential => "sequential",
        };
        f.write_str(name)
    }
}

/// Which complexity scorer a run uses. Chosen once, at job construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Edge/gradient response per pixel
    Pixelwise,
    /// Learned coarse field plus regression head
    Learned,
}

impl ScorerKind {
    /// Pixel size of one score-field cell for this scorer.
    pub fn granularity(self) -> u32 {
        match self {
            ScorerKind::Pixelwise => 1,
            ScorerKind::Learned => 8,
        }
    }

    /// Whether the scorer owns state that must never be driven concurrently.
    pub fn is_exclusive(self) -> bool {
        matches!(self, ScorerKind::Learned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScorerKind::Pixelwise => "pixelwise",
            ScorerKind::Learned => "learned",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScorerKind {
    type Err = TileError;

    fn from_str(s: &str) -> TileResult<Self> {
        match s.to_lowercase().as_str() {
            "pixelwise" | "pixel" => Ok(ScorerKind::Pixelwise),
            "learned" | "neural" => Ok(ScorerKind::Learned),
            _ => Err(TileError::config(
                "scorer",
                s,
                "unknown scorer, use: pixelwise, learned",
            )),
        }
    }
}

/// Configuration for one extraction run.
#[derive(Clone, Debug)]
pub struct TilingConfig {
    /// Folder scanned for source images.
    pub in_folder: PathBuf,

    /// Folder tiles are written to. Existing names in it mark images as done.
    pub out_folder: PathBuf,

    /// Side of every extracted tile, in pixels.
    pub tile_size: u32,

    /// Extra downscale applied to the score field before searching.
    ///
    /// Only honoured by the pixel-wise scorer; the learned scorer already
    /// searches a field eight times coarser than the image.
    pub scale: u32,

    /// Parallelism requested for the batch.
    ///
    /// The learned scorer forces [`ProcessMode::Sequential`] regardless.
    pub process_mode: ProcessMode,

    /// Extract several tiles from images much larger than one tile.
    pub dynamic_tile_count: bool,

    /// Minimum tile quality; extraction for an image stops at the first
    /// tile below it. `0.0` disables the check.
    pub score_threshold: f32,

    /// Write single-channel tiles.
    pub grayscale: bool,

    pub scorer: ScorerKind,

    /// Pool size for thread and process modes. `None` uses every core.
    pub workers: Option<usize>,

    /// Median blur before computing the pixel-wise edge response.
    pub denoise: bool,

    /// ONNX backbone producing the learned field and features.
    pub backbone_model: Option<PathBuf>,

    /// ONNX regression head turning a feature slice into a quality score.
    pub head_model: Option<PathBuf>,
}

impl Default for TilingConfig {
    /// Defaults: 512 px tiles, pixel-wise scorer, thread pool, one tile per
    /// image, no threshold, colour output.
    fn default() -> Self {
        Self {
            in_folder: PathBuf::from("."),
            out_folder: PathBuf::from("tiles"),
            tile_size: 512,
            scale: 1,
            process_mode: ProcessMode::Thread,
            dynamic_tile_count: false,
            score_threshold: 0.0,
            grayscale: false,
            scorer: ScorerKind::Pixelwise,
            workers: None,
            denoise: false,
            backbone_model: None,
            head_model: None,
        }
    }
}

impl TilingConfig {
    /// Creates a new configuration with the core parameters; the rest keep
    /// their defaults.
    pub fn new(
        in_folder: impl Into<PathBuf>,
        out_folder: impl Into<PathBuf>,
        tile_size: u32,
        scorer: ScorerKind,
    ) -> Self {
        Self {
            in_folder: in_folder.into(),
            out_folder: out_folder.into(),
            tile_size,
            scorer,
            ..Self::default()
        }
    }

    /// Validates the configuration parameters.
    ///
    /// Runs before any batch work; every failure is an
    /// [`TileError::InvalidConfiguration`] and fatal to the run.
    pub fn validate(&self) -> TileResult<()> {
        if self.tile_size == 0 {
            return Err(TileError::config(
                "tile_size",
                self.tile_size.to_string(),
                "must be greater than 0",
            ));
        }
        let g = self.scorer.granularity();
        if self.tile_size % g != 0 {
            return Err(TileError::config(
                "tile_size",
                self.tile_size.to_string(),
                format!("must be a multiple of {} for the {} scorer", g, self.scorer),
            ));
        }
        if self.scale == 0 {
            return Err(TileError::config(
                "scale",
                self.scale.to_string(),
                "must be at least 1",
            ));
        }
        if self.scorer == ScorerKind::Pixelwise && self.scale > self.tile_size {
            return Err(TileError::config(
                "scale",
                self.scale.to_string(),
                format!("must not exceed tile_size ({})", self.tile_size),
            ));
        }
        if !self.score_threshold.is_finite() || self.score_threshold < 0.0 {
            return Err(TileError::config(
                "score_threshold",
                self.score_threshold.to_string(),
                "must be a finite value >= 0",
            ));
        }
        if self.workers == Some(0) {
            return Err(TileError::config("workers", "0", "must be at least 1"));
        }
        Ok(())
    }

    /// Backbone and head paths for the ONNX learned scorer.
    pub fn learned_model_paths(&self) -> TileResult<(&Path, &Path)> {
        match (&self.backbone_model, &self.head_model) {
            (Some(backbone), Some(head)) => Ok((backbone.as_path(), head.as_path())),
            _ => Err(TileError::config(
                "scorer",
                "learned",
                "requires both --backbone-model and --head-model",
            )),
        }
    }

    /// Process mode actually used: exclusive scorers always run sequentially.
    pub fn effective_process_mode(&self) -> ProcessMode {
        if self.scorer.is_exclusive() {
            ProcessMode::Sequential
        } else {
            self.process_mode
        }
    }

    /// Per-image job derived from this configuration.
    pub fn to_tiling_job(&self) -> TilingJob {
        TilingJob {
            tile_size: self.tile_size,
            scale: match self.scorer {
                ScorerKind::Pixelwise => self.scale,
                ScorerKind::Learned => 1,
            },
            dynamic_tile_count: self.dynamic_tile_count,
            score_threshold: self.score_threshold,
            scorer: self.scorer,
            grayscale: self.grayscale,
            denoise: self.denoise,
        }
    }
}

/// Immutable per-image configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TilingJob {
    pub tile_size: u32,
    /// Extra search downscale; always 1 for the learned scorer.
    pub scale: u32,
    pub dynamic_tile_count: bool,
    pub score_threshold: f32,
    pub scorer: ScorerKind,
    pub grayscale: bool,
    pub denoise: bool,
}

impl TilingJob {
    /// Tile side in score-field cells.
    pub fn tile_cells(&self) -> usize {
        (self.tile_size / self.scorer.granularity()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TilingConfig::default();
        assert_eq!(config.tile_size, 512);
        assert_eq!(config.scale, 1);
        assert_eq!(config.process_mode, ProcessMode::Thread);
        assert_eq!(config.scorer, ScorerKind::Pixelwise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TilingConfig::default();

        config.tile_size = 0;
        assert!(config.validate().is_err());
        config.tile_size = 512;

        config.scale = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.category(), "config");
        config.scale = 1;

        config.score_threshold = -0.5;
        assert!(config.validate().is_err());
        config.score_threshold = f32::NAN;
        assert!(config.validate().is_err());
        config.score_threshold = 0.1;

        config.workers = Some(0);
        assert!(config.validate().is_err());
        config.workers = Some(4);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scale_larger_than_tile_rejected() {
        let mut config = TilingConfig::default();
        config.tile_size = 64;
        config.scale = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_learned_tile_size_must_align_to_cells() {
        let mut config = TilingConfig::default();
        config.scorer = ScorerKind::Learned;
        config.tile_size = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("multiple of 8"));
    }

    #[test]
    fn test_unknown_scorer_is_configuration_error() {
        let err = "sharpness".parse::<ScorerKind>().unwrap_err();
        assert_eq!(err.category(), "config");
        assert_eq!("Learned".parse::<ScorerKind>().unwrap(), ScorerKind::Learned);
    }

    #[test]
    fn test_learned_forces_sequential_and_ignores_scale() {
        let mut config = TilingConfig::default();
        config.scorer = ScorerKind::Learned;
        config.process_mode = ProcessMode::Process;
        config.scale = 4;
        assert_eq!(config.effective_process_mode(), ProcessMode::Sequential);
        assert_eq!(config.to_tiling_job().scale, 1);
        assert_eq!(config.to_tiling_job().tile_cells(), 64);
    }

    #[test]
    fn test_learned_model_paths_require_both_files() {
        let mut config = TilingConfig::default();
        config.scorer = ScorerKind::Learned;
        config.backbone_model = Some(PathBuf::from("backbone.onnx"));
        assert!(config.learned_model_paths().is_err());
        config.head_model = Some(PathBuf::from("head.onnx"));
        let (backbone, head) = config.learned_model_paths().unwrap();
        assert_eq!(backbone, Path::new("backbone.onnx"));
        assert_eq!(head, Path::new("head.onnx"));
    }
}
