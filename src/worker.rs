//! Process-mode worker protocol.
//!
//! The supervisor starts `ctile worker --request <json>` for one image. The
//! child prints a single [`WorkerReport`] line on stdout and exits; logs go to
//! stderr. A child that crashes before reporting is treated as a failed image
//! by the supervisor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ScorerKind, TilingJob};
use crate::error::{TileError, TileResult};
use crate::io::FsImageStore;
use crate::processing::TileExtractor;
use crate::scoring::{ComplexityScorer, PixelwiseScorer};
use crate::session::{process_image, ImageOutcome};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub image: PathBuf,
    pub job: TilingJob,
    pub out_folder: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub status: ImageOutcome,
    pub tiles_written: usize,
}

impl WorkerReport {
    fn from_outcome(status: ImageOutcome) -> Self {
        let tiles_written = match status {
            ImageOutcome::Tiles(n) => n,
            _ => 0,
        };
        Self {
            status,
            tiles_written,
        }
    }
}

fn process_request(request: &WorkerRequest) -> TileResult<ImageOutcome> {
    // Only the pixel-wise scorer is ever spread over processes.
    if request.job.scorer != ScorerKind::Pixelwise {
        return Err(TileError::worker(
            &request.image,
            format!("{} scorer cannot run in a worker process", request.job.scorer),
        ));
    }
    let mut scorer = PixelwiseScorer::new(request.job.denoise);
    let mut extractor = TileExtractor::new(request.job, scorer.granularity())?;
    let store = FsImageStore::new(&request.out_folder)?;
    process_image(&mut extractor, &mut scorer, &store, &store, &request.image)
}

/// Handle one request. Never fails: errors become a `Failed` report.
pub fn run_worker(request: &WorkerRequest) -> WorkerReport {
    let status = match process_request(request) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("worker: {}: {}", request.image.display(), e);
            ImageOutcome::Failed(e.to_string())
        }
    };
    WorkerReport::from_outcome(status)
}
