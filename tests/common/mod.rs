//! Common test utilities and helpers for the complexity tiler tests
//!
//! This module provides synthetic images, scripted learned models and
//! output-folder assertions shared by the integration tests.

#![allow(dead_code)]

/// Synthetic source images
pub mod test_images {
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use std::path::{Path, PathBuf};

    /// Create a flat image of one gray level
    pub fn create_solid_image(width: u32, height: u32, level: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([level])))
    }

    /// Create a checkerboard with `cell` px squares covering the whole image
    pub fn create_checkerboard_image(width: u32, height: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([15, 15, 15])
            }
        }))
    }

    /// Create a flat image with one detailed square patch at (`top`, `left`)
    pub fn create_patch_image(width: u32, height: u32, top: u32, left: u32, patch: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let inside = x >= left && x < left + patch && y >= top && y < top + patch;
            if inside && (x / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([50, 50, 50])
            }
        }))
    }

    /// Save `image` as `<dir>/<name>` and return the path
    pub fn save(dir: &Path, name: &str, image: &DynamicImage) -> PathBuf {
        let path = dir.join(name);
        image.save(&path).expect("write test image");
        path
    }
}

/// Learned-model doubles
pub mod mock_model {
    use complexity_tiler::error::TileResult;
    use complexity_tiler::scoring::{ComplexityModel, ModelOutput};
    use ndarray::{Array2, Array3, ArrayView3};

    /// Uniform field; the head returns a fixed score sequence, then zeros
    pub struct ScriptedModel {
        scores: Vec<f32>,
        calls: usize,
    }

    impl ScriptedModel {
        pub fn new(scores: &[f32]) -> Self {
            Self {
                scores: scores.to_vec(),
                calls: 0,
            }
        }
    }

    impl ComplexityModel for ScriptedModel {
        fn infer(&mut self, image: ArrayView3<'_, f32>) -> TileResult<ModelOutput> {
            let (_, h, w) = image.dim();
            let (rows, cols) = (h / 8, w / 8);
            Ok(ModelOutput {
                field: Array2::from_elem((rows, cols), 1.0),
                features: Array3::zeros((4, rows, cols)),
            })
        }

        fn regress(&mut self, _features: ArrayView3<'_, f32>) -> TileResult<f32> {
            let score = self.scores.get(self.calls).copied().unwrap_or(0.0);
            self.calls += 1;
            Ok(score)
        }
    }
}

/// Output-folder assertions
pub mod assertions {
    use std::path::Path;

    /// Sorted file names inside `dir`
    pub fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read output folder")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Assert every PNG in `dir` is a `size`×`size` tile, except the listed pass-through files
    pub fn assert_tiles_sized(dir: &Path, size: u32, pass_through: &[&str]) {
        for name in file_names(dir) {
            if pass_through.contains(&name.as_str()) {
                continue;
            }
            let img = image::open(dir.join(&name)).expect("decode tile");
            assert_eq!(
                (img.width(), img.height()),
                (size, size),
                "{} has the wrong size",
                name
            );
        }
    }
}
