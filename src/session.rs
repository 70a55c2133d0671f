//! # Batch Session
//!
//! Runs a tiling job over a collection of images and reports what happened.
//! Provides the same builder-style API as the rest of the crate: configure
//! once, build, run.
//!
//! ## Architecture
//!
//! 1. **BatchSessionBuilder**: validates the configuration and binds the scorer
//! 2. **BatchSession**: fixes the execution mode for the whole batch
//! 3. **process_image**: one image, start to finish, shared by every mode
//! 4. **BatchSummary**: end-of-run counts
//!
//! ## Execution Modes
//!
//! | Mode | Workers | Scorer instances |
//! |------|---------|------------------|
//! | `Sequential` | the calling thread | one |
//! | `Thread` | rayon pool | one `PixelwiseScorer` per task |
//! | `Process` | rayon pool of supervisors | one per `ctile worker` child |
//!
//! The learned scorer always runs `Sequential`: its model is owned by the
//! session and only ever driven from the calling thread.
//!
//! ## Failure Isolation
//!
//! Configuration errors surface from [`BatchSessionBuilder::build`]. Once a
//! batch runs, every per-image error is logged, counted in
//! [`BatchSummary::skipped_error`] and the batch moves on.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ProcessMode, ScorerKind, TilingConfig, TilingJob};
use crate::error::{TileError, TileResult};
use crate::io::{
    base_name, indexed_tile_name, is_already_processed, single_tile_name, FsImageStore,
    ImageSource, LogProgress, ProgressSink, TileSink,
};
use crate::processing::{ImageTiles, TileExtractor};
use crate::scoring::{ComplexityModel, ComplexityScorer, LearnedScorer, PixelwiseScorer};
use crate::worker::{WorkerReport, WorkerRequest};

/// What happened to one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ImageOutcome {
    /// Tiles written; zero when the field was exhausted or the first tile
    /// missed the threshold.
    Tiles(usize),
    /// Smaller than a tile, copied unchanged.
    PassThrough,
    SkippedExisting,
    Failed(String),
}

/// End-of-run counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped_existing: usize,
    pub skipped_error: usize,
    pub tiles_written: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Tiles(n) => {
                self.processed += 1;
                self.tiles_written += n;
            }
            ImageOutcome::PassThrough => self.processed += 1,
            ImageOutcome::SkippedExisting => self.skipped_existing += 1,
            ImageOutcome::Failed(_) => self.skipped_error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped_existing + self.skipped_error
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped (existing), {} skipped (error), {} tiles written",
            self.processed, self.skipped_existing, self.skipped_error, self.tiles_written
        )
    }
}

/// Extract and write the tiles of one image.
///
/// Dynamic plans name tiles `<base>_<i>`; single tiles and pass-through
/// copies are written as `<base>`.
pub fn process_image<S, I, T>(
    extractor: &mut TileExtractor,
    scorer: &mut S,
    source: &I,
    sink: &T,
    path: &Path,
) -> TileResult<ImageOutcome>
where
    S: ComplexityScorer + ?Sized,
    I: ImageSource + ?Sized,
    T: TileSink + ?Sized,
{
    let base = base_name(path);
    let image = source.read_image(path)?;
    let dynamic = extractor.plan(image.height(), image.width()).is_dynamic();

    match extractor.extract(scorer, image)? {
        ImageTiles::PassThrough(image) => {
            sink.write(&single_tile_name(&base), &image)?;
            Ok(ImageOutcome::PassThrough)
        }
        ImageTiles::Tiles(tiles) => {
            let mut written_paths: Vec<PathBuf> = Vec::with_capacity(tiles.len());
            for (index, tile) in tiles.iter().enumerate() {
                let name = if dynamic {
                    indexed_tile_name(&base, index)
                } else {
                    single_tile_name(&base)
                };
                let written = match sink.write(&name, &tile.image) {
                    Ok(written) => written,
                    Err(e) => {
                        // A partial set would mark the image as done on the next run.
                        for done in &written_paths {
                            if let Err(cleanup) = sink.remove(done) {
                                log::warn!("{}", cleanup);
                            }
                        }
                        return Err(e);
                    }
                };
                log::debug!(
                    "{} <- ({}, {}) quality {:.4}",
                    written.display(),
                    tile.candidate.top_y,
                    tile.candidate.top_x,
                    tile.quality
                );
                written_paths.push(written);
            }
            Ok(ImageOutcome::Tiles(tiles.len()))
        }
    }
}

fn skip_existing(path: &Path, existing: &HashSet<String>) -> Option<ImageOutcome> {
    is_already_processed(&base_name(path), existing).then_some(ImageOutcome::SkippedExisting)
}

fn outcome_of(path: &Path, result: TileResult<ImageOutcome>) -> ImageOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("Skipping {}: {}", path.display(), e);
            ImageOutcome::Failed(e.to_string())
        }
    }
}

/// A configured batch run.
pub struct BatchSession {
    job: TilingJob,
    mode: ProcessMode,
    workers: Option<usize>,
    store: FsImageStore,
    progress: Box<dyn ProgressSink + Send + Sync>,
    learned: Option<LearnedScorer>,
    worker_executable: Option<PathBuf>,
}

impl BatchSession {
    /// Create a new batch session using the builder pattern.
    pub fn builder() -> BatchSessionBuilder {
        BatchSessionBuilder::new()
    }

    /// Execution mode fixed for this session.
    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    pub fn job(&self) -> &TilingJob {
        &self.job
    }

    /// Process `paths` and return the end-of-run counts.
    ///
    /// Only fails when the batch cannot start at all (unreadable output
    /// folder, thread pool creation).
    pub fn run(&mut self, paths: &[PathBuf]) -> TileResult<BatchSummary> {
        let existing = self.store.existing_names()?;
        log::info!(
            "Tiling {} image(s) into {} ({} mode, {} scorer, {} px tiles)",
            paths.len(),
            self.store.out_folder().display(),
            self.mode,
            self.job.scorer,
            self.job.tile_size
        );

        let outcomes = match self.mode {
            ProcessMode::Sequential => self.run_sequential(paths, &existing)?,
            ProcessMode::Thread => self.run_threads(paths, &existing)?,
            ProcessMode::Process => self.run_processes(paths, &existing)?,
        };

        let mut summary = BatchSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }
        log::info!("Batch finished: {}", summary);
        Ok(summary)
    }

    fn run_sequential(
        &mut self,
        paths: &[PathBuf],
        existing: &HashSet<String>,
    ) -> TileResult<Vec<ImageOutcome>> {
        let mut pixelwise = PixelwiseScorer::new(self.job.denoise);
        let scorer: &mut dyn ComplexityScorer = match self.learned.as_mut() {
            Some(learned) => learned,
            None => &mut pixelwise,
        };
        let mut extractor = TileExtractor::new(self.job, scorer.granularity())?;

        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = match skip_existing(path, existing) {
                Some(skipped) => skipped,
                None => outcome_of(
                    path,
                    process_image(&mut extractor, &mut *scorer, &self.store, &self.store, path),
                ),
            };
            self.progress.image_finished(path, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn pool(&self) -> TileResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.unwrap_or(0))
            .build()
            .map_err(|e| TileError::config("workers", format!("{:?}", self.workers), e.to_string()))
    }

    fn run_threads(
        &self,
        paths: &[PathBuf],
        existing: &HashSet<String>,
    ) -> TileResult<Vec<ImageOutcome>> {
        let job = self.job;
        // Fail on a bad job before any worker starts.
        TileExtractor::new(job, ScorerKind::Pixelwise.granularity())?;

        let (store, progress) = (&self.store, &*self.progress);
        let pool = self.pool()?;
        Ok(pool.install(|| {
            paths
                .par_iter()
                .map_init(
                    || TileExtractor::new(job, ScorerKind::Pixelwise.granularity()),
                    |extractor, path| {
                        let outcome = match (skip_existing(path, existing), extractor) {
                            (Some(skipped), _) => skipped,
                            (None, Ok(extractor)) => {
                                let mut scorer = PixelwiseScorer::new(job.denoise);
                                outcome_of(
                                    path,
                                    process_image(extractor, &mut scorer, store, store, path),
                                )
                            }
                            (None, Err(e)) => ImageOutcome::Failed(e.to_string()),
                        };
                        progress.image_finished(path, &outcome);
                        outcome
                    },
                )
                .collect()
        }))
    }

    fn run_processes(
        &self,
        paths: &[PathBuf],
        existing: &HashSet<String>,
    ) -> TileResult<Vec<ImageOutcome>> {
        let executable = match &self.worker_executable {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .map_err(|e| TileError::io("locate worker executable", e))?,
        };
        let (store, progress) = (&self.store, &*self.progress);
        let job = self.job;
        let pool = self.pool()?;
        Ok(pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let outcome = match skip_existing(path, existing) {
                        Some(skipped) => skipped,
                        None => {
                            let request = WorkerRequest {
                                image: path.clone(),
                                job,
                                out_folder: store.out_folder().to_path_buf(),
                            };
                            outcome_of(path, spawn_worker(&executable, &request))
                        }
                    };
                    progress.image_finished(path, &outcome);
                    outcome
                })
                .collect()
        }))
    }
}

/// Run one image in a `ctile worker` child and read its report.
fn spawn_worker(executable: &Path, request: &WorkerRequest) -> TileResult<ImageOutcome> {
    let payload = serde_json::to_string(request)
        .map_err(|e| TileError::worker(&request.image, format!("encode request: {}", e)))?;
    let output = Command::new(executable)
        .arg("worker")
        .arg("--request")
        .arg(payload)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| TileError::io_at("spawn worker", executable, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| serde_json::from_str::<WorkerReport>(line).ok());

    match report {
        Some(report) => match report.status {
            ImageOutcome::Failed(reason) => Err(TileError::worker(&request.image, reason)),
            status => Ok(status),
        },
        None => Err(TileError::worker(
            &request.image,
            format!("no report from child ({})", output.status),
        )),
    }
}

/// Builder for batch sessions.
pub struct BatchSessionBuilder {
    config: TilingConfig,
    progress: Option<Box<dyn ProgressSink + Send + Sync>>,
    model: Option<Box<dyn ComplexityModel>>,
    worker_executable: Option<PathBuf>,
}

impl Default for BatchSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSessionBuilder {
    /// Create a new session builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: TilingConfig::default(),
            progress: None,
            model: None,
            worker_executable: None,
        }
    }

    /// Use `config` for the run.
    pub fn with_config(mut self, config: TilingConfig) -> Self {
        self.config = config;
        self
    }

    /// Report per-image progress to `progress` instead of the log.
    pub fn with_progress<P: ProgressSink + Send + Sync + 'static>(mut self, progress: P) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Bind the learned scorer to an already loaded model.
    pub fn with_learned_model(mut self, model: Box<dyn ComplexityModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Binary started for process-mode workers. Defaults to the running
    /// executable.
    pub fn with_worker_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_executable = Some(path.into());
        self
    }

    /// Validate the configuration and bind the scorer.
    pub fn build(self) -> TileResult<BatchSession> {
        let config = self.config;
        config.validate()?;

        let mode = config.effective_process_mode();
        if mode != config.process_mode {
            log::info!(
                "{} scorer owns its model exclusively; running {} instead of {}",
                config.scorer,
                mode,
                config.process_mode
            );
        }

        let learned = match config.scorer {
            ScorerKind::Pixelwise => None,
            ScorerKind::Learned => {
                let model = match self.model {
                    Some(model) => model,
                    None => load_learned_model(&config)?,
                };
                Some(LearnedScorer::new(model))
            }
        };

        Ok(BatchSession {
            job: config.to_tiling_job(),
            mode,
            workers: config.workers,
            store: FsImageStore::new(&config.out_folder)?,
            progress: self.progress.unwrap_or_else(|| Box::new(LogProgress)),
            learned,
            worker_executable: self.worker_executable,
        })
    }
}

#[cfg(feature = "onnx")]
fn load_learned_model(config: &TilingConfig) -> TileResult<Box<dyn ComplexityModel>> {
    let (backbone, head) = config.learned_model_paths()?;
    Ok(Box::new(crate::scoring::OnnxComplexityModel::load(backbone, head)?))
}

#[cfg(not(feature = "onnx"))]
fn load_learned_model(_config: &TilingConfig) -> TileResult<Box<dyn ComplexityModel>> {
    Err(TileError::config(
        "scorer",
        "learned",
        "this build has no inference runtime; rebuild with --features onnx",
    ))
}
