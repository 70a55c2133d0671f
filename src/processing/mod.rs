//! # Processing Module
//!
//! This module contains the per-image tiling pipeline: planning, searching and
//! extracting tiles from one decoded image.

pub mod extract;

pub use extract::{extract_tiles, ExtractedTile, ImageTiles, TileExtractor};
