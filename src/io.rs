//! # Image I/O Boundary
//!
//! Decoding sources, writing tiles and reporting progress are collaborators of
//! the batch session, not part of it. The session only talks to the traits in
//! this module; [`FsImageStore`] and [`LogProgress`] are the folder-backed
//! implementations the CLI uses.
//!
//! ## Output Naming
//!
//! | Case | File name |
//! |------|-----------|
//! | single tile or pass-through | `<base>.png` |
//! | dynamic tiles | `<base>_0.png`, `<base>_1.png`, ... |
//! | name already taken | `<name>-1.png`, `<name>-2.png`, ... |
//!
//! An image counts as done when `<base>.png` or `<base>_0.png` is already in
//! the output folder.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};

use crate::error::{TileError, TileResult};
use crate::session::ImageOutcome;

/// Extensions picked up by [`list_images`], lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff"];

const TILE_EXTENSION: &str = "png";

/// Decode capability.
pub trait ImageSource {
    fn read_image(&self, path: &Path) -> TileResult<DynamicImage>;
}

/// Encode capability with collision-free naming.
pub trait TileSink {
    /// Write `image` under `name` (no extension). Returns the path actually
    /// used, which differs from the requested one if it was already taken.
    fn write(&self, name: &str, image: &DynamicImage) -> TileResult<PathBuf>;

    /// Delete a tile previously returned by [`TileSink::write`].
    fn remove(&self, path: &Path) -> TileResult<()>;

    /// File names currently in the destination.
    fn existing_names(&self) -> TileResult<HashSet<String>>;
}

/// Best-effort side channel; implementations must not fail the batch.
pub trait ProgressSink {
    fn image_finished(&self, path: &Path, outcome: &ImageOutcome);
}

/// Base name used for every output of `path`.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

pub fn single_tile_name(base: &str) -> String {
    base.to_string()
}

pub fn indexed_tile_name(base: &str, index: usize) -> String {
    format!("{}_{}", base, index)
}

/// Whether an image's expected output is already in `existing`.
pub fn is_already_processed(base: &str, existing: &HashSet<String>) -> bool {
    let single = format!("{}.{}", single_tile_name(base), TILE_EXTENSION);
    let first = format!("{}.{}", indexed_tile_name(base, 0), TILE_EXTENSION);
    existing.contains(&single) || existing.contains(&first)
}

/// Sorted list of the images directly inside `folder`.
pub fn list_images(folder: &Path) -> TileResult<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).map_err(|e| TileError::io_at("list images", folder, e))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| TileError::io_at("list images", folder, e))?
            .path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if supported && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Folder-backed source and sink.
#[derive(Clone, Debug)]
pub struct FsImageStore {
    out_folder: PathBuf,
}

impl FsImageStore {
    /// Creates the output folder if needed.
    pub fn new(out_folder: impl Into<PathBuf>) -> TileResult<Self> {
        let out_folder = out_folder.into();
        fs::create_dir_all(&out_folder)
            .map_err(|e| TileError::io_at("create output folder", &out_folder, e))?;
        Ok(Self { out_folder })
    }

    pub fn out_folder(&self) -> &Path {
        &self.out_folder
    }

    fn tile_path(&self, name: &str) -> PathBuf {
        self.out_folder.join(format!("{}.{}", name, TILE_EXTENSION))
    }

    /// Reserve the first free name, creating the file atomically so two
    /// workers can never claim the same one.
    fn create_unique(&self, name: &str) -> TileResult<(PathBuf, File)> {
        let mut suffix = 0usize;
        loop {
            let path = if suffix == 0 {
                self.tile_path(name)
            } else {
                self.tile_path(&format!("{}-{}", name, suffix))
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(TileError::io_at("create tile", &path, e)),
            }
        }
    }
}

impl ImageSource for FsImageStore {
    fn read_image(&self, path: &Path) -> TileResult<DynamicImage> {
        image::open(path).map_err(|e| TileError::decode(path, e))
    }
}

impl TileSink for FsImageStore {
    fn write(&self, name: &str, image: &DynamicImage) -> TileResult<PathBuf> {
        let (path, file) = self.create_unique(name)?;
        let mut writer = BufWriter::new(file);
        let written = image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|e| std::io::Error::other(e.to_string()))
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            drop(writer);
            // A half-written tile would later read as a finished image.
            let _ = fs::remove_file(&path);
            return Err(TileError::io_at("encode tile", &path, e));
        }
        Ok(path)
    }

    fn remove(&self, path: &Path) -> TileResult<()> {
        fs::remove_file(path).map_err(|e| TileError::io_at("remove tile", path, e))
    }

    fn existing_names(&self) -> TileResult<HashSet<String>> {
        let entries = fs::read_dir(&self.out_folder)
            .map_err(|e| TileError::io_at("list output folder", &self.out_folder, e))?;
        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect())
    }
}

/// Progress reporting through `log`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn image_finished(&self, path: &Path, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Tiles(n) => log::info!("{}: {} tile(s)", path.display(), n),
            ImageOutcome::PassThrough => {
                log::info!("{}: smaller than a tile, copied", path.display())
            }
            ImageOutcome::SkippedExisting => {
                log::debug!("{}: already processed", path.display())
            }
            // The session already warned with the full error.
            ImageOutcome::Failed(_) => log::debug!("{}: failed", path.display()),
        }
    }
}
