//! # Complexity Tiler Library
//!
//! Extracts the most visually complex fixed-size tiles from large images.
//! Each image is scored into a complexity field, the best tile-sized window
//! is found greedily, extracted and marked as spent, and the search repeats
//! until the image's tile budget or quality floor stops it.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `config`: Run configuration, validation and the per-image job
//! - `scoring`: Pixel-wise and learned complexity scorers behind one trait
//! - `processing`: Per-image planning, search and extraction
//! - `io`: Image decode, collision-free tile writing, progress reporting
//! - `session`: Batch orchestration over threads, processes or a single loop
//! - `worker`: The process-mode child protocol
//!
//! The field, window search and tile-count planning live in the
//! `tile-search` crate and are re-exported here.
//!
//! ## Example
//!
//! ```rust,no_run
//! use complexity_tiler::{run_batch, ScorerKind, TilingConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = TilingConfig::new("photos", "tiles", 512, ScorerKind::Pixelwise);
//! config.dynamic_tile_count = true;
//! config.score_threshold = 0.05;
//!
//! let summary = run_batch(config)?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod processing;
pub mod scoring;
pub mod session;
pub mod worker;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, Recoverable, TileError, TileResult};

pub use config::{ProcessMode, ScorerKind, TilingConfig, TilingJob};
pub use processing::{extract_tiles, ExtractedTile, ImageTiles, TileExtractor};
pub use scoring::{ComplexityModel, ComplexityScorer, LearnedScorer, PixelwiseScorer};
pub use session::{BatchSession, BatchSummary, ImageOutcome};

/// Re-export the search primitives
pub use tile_search::{ScoreField, TileCandidate, TileCountPlanner, TilePlan, TileSelector};

/// Tile every image in `config.in_folder` into `config.out_folder`.
///
/// Configuration errors are returned before any image is touched; per-image
/// failures only show up in the returned summary.
pub fn run_batch(config: TilingConfig) -> TileResult<BatchSummary> {
    let paths = io::list_images(&config.in_folder)?;
    let mut session = BatchSession::builder().with_config(config).build()?;
    session.run(&paths)
}
