// SPDX-License-Identifier: MIT
//! # Tile Count Planning
//!
//! Decides how many tiles one image yields and when extraction stops early.
//!
//! | Condition | Plan |
//! |-----------|------|
//! | `h < tile` or `w < tile` | pass-through, no tiles |
//! | dynamic off, or `h·w <= tile²·4` | one tile |
//! | otherwise | up to `⌊h·w / (tile²·2)⌋` tiles |
//!
//! During a dynamic run a tile whose quality falls below the configured
//! threshold ends the run; it is not written and the remaining budget is
//! abandoned rather than retried.

/// Extraction plan for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TilePlan {
    /// Image is smaller than a tile in at least one dimension.
    PassThrough,
    /// Exactly one tile.
    Single,
    /// Up to `n` tiles, searched against progressively spent state.
    Dynamic(u32),
}

impl TilePlan {
    /// Maximum number of tiles this plan may produce.
    pub fn budget(&self) -> u32 {
        match self {
            TilePlan::PassThrough => 0,
            TilePlan::Single => 1,
            TilePlan::Dynamic(n) => *n,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, TilePlan::Dynamic(_))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TileCountPlanner {
    pub tile_size: u32,
    pub dynamic: bool,
    /// Quality floor; `0.0` disables the check.
    pub score_threshold: f32,
}

impl TileCountPlanner {
    pub fn new(tile_size: u32, dynamic: bool, score_threshold: f32) -> Self {
        Self {
            tile_size,
            dynamic,
            score_threshold,
        }
    }

    pub fn plan(&self, height: u32, width: u32) -> TilePlan {
        if height < self.tile_size || width < self.tile_size {
            return TilePlan::PassThrough;
        }
        let area = u64::from(height) * u64::from(width);
        let footprint = u64::from(self.tile_size) * u64::from(self.tile_size);
        if !self.dynamic || area <= footprint * 4 {
            return TilePlan::Single;
        }
        let n = (area / (footprint * 2)).min(u64::from(u32::MAX)) as u32;
        TilePlan::Dynamic(n.max(1))
    }

    /// Whether a tile of quality `score` may be written.
    pub fn accepts(&self, score: f32) -> bool {
        self.score_threshold <= 0.0 || score >= self.score_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_count_example() {
        // 2000 × 1000 = 2,000,000 px, tile 512 ⇒ ⌊2e6 / 524288⌋ = 3
        let planner = TileCountPlanner::new(512, true, 0.0);
        assert_eq!(planner.plan(1000, 2000), TilePlan::Dynamic(3));
    }

    #[test]
    fn test_small_area_gets_one_tile() {
        let planner = TileCountPlanner::new(512, true, 0.0);
        // Exactly 4 footprints still counts as a single tile.
        assert_eq!(planner.plan(1024, 1024), TilePlan::Single);
        assert_eq!(planner.plan(512, 512), TilePlan::Single);
    }

    #[test]
    fn test_dynamic_disabled() {
        let planner = TileCountPlanner::new(256, false, 0.0);
        assert_eq!(planner.plan(4000, 4000), TilePlan::Single);
    }

    #[test]
    fn test_pass_through_when_smaller_than_tile() {
        let planner = TileCountPlanner::new(512, true, 0.0);
        assert_eq!(planner.plan(511, 4000), TilePlan::PassThrough);
        assert_eq!(planner.plan(4000, 100), TilePlan::PassThrough);
        assert_eq!(TilePlan::PassThrough.budget(), 0);
    }

    #[test]
    fn test_threshold_floor() {
        let planner = TileCountPlanner::new(64, true, 0.1);
        assert!(planner.accepts(0.5));
        assert!(planner.accepts(0.1));
        assert!(!planner.accepts(0.02));

        let disabled = TileCountPlanner::new(64, true, 0.0);
        assert!(disabled.accepts(0.0));
    }
}
