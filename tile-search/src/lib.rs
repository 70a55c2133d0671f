// SPDX-License-Identifier: MIT
//! # tile-search: Complexity-Driven Tile Search
//!
//! Pure search machinery for picking the most detailed square tiles out of a
//! large image. No image decoding or encoding happens here; callers hand in a
//! score field produced by a complexity scorer and get back rectangles.
//!
//! ## Key Components
//!
//! - [`field`]: score fields, feature tensors, sentinel invalidation
//! - [`selector`]: greedy sliding-window search with a half-tile stride
//! - [`downsample`]: searching an area-reduced copy of a very large field
//! - [`planner`]: how many tiles an image yields, and the quality floor
//!
//! ## Usage Example
//!
//! ```rust
//! use ndarray::Array2;
//! use tile_search::{ScoreField, TileSelector};
//!
//! let mut field = ScoreField::new(Array2::from_elem((64, 64), 0.25), 1);
//! let selector = TileSelector::new(32);
//!
//! let win = selector.select_best(&field).expect("fresh field has a candidate");
//! field.invalidate(win.row, win.col, win.cells, win.cells);
//! assert!(field.is_sentinel(win.row, win.col));
//! ```

pub mod downsample;
pub mod error;
pub mod field;
pub mod planner;
pub mod selector;

pub use downsample::{reduce_field, DownsampledSearch};
pub use error::SearchError;
pub use field::{FeatureTensor, FieldWindow, ScoreField, TileCandidate, SENTINEL};
pub use planner::{TileCountPlanner, TilePlan};
pub use selector::TileSelector;
