use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use complexity_tiler::config::{ProcessMode, ScorerKind, TilingConfig};
use complexity_tiler::worker::{run_worker, WorkerRequest};
use env_logger::Env;

/// Extract the most detailed square tiles from a folder of images.
#[derive(Parser, Debug)]
#[command(name = "ctile")]
#[command(about = "Extract the most visually complex tiles from large images")]
#[command(long_about = "Scores every image for visual complexity, then greedily cuts out the \
best non-overlapping tiles. Images smaller than a tile are copied unchanged; images whose \
tiles already exist in the output folder are skipped.")]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Folder of source images
    #[arg(help = "Folder of source images")]
    in_folder: Option<PathBuf>,

    /// Folder tiles are written to
    #[arg(short, long, default_value = "tiles", help = "Output folder (created if missing)")]
    out_folder: PathBuf,

    #[arg(short, long, default_value_t = 512, help = "Tile side in pixels")]
    tile_size: u32,

    #[arg(short, long, default_value_t = 1,
          help = "Extra search downscale for very large images (pixel-wise scorer only)")]
    scale: u32,

    #[arg(short = 'm', long, value_enum, default_value_t = ProcessMode::Thread,
          help = "How images are spread over workers")]
    process_mode: ProcessMode,

    #[arg(short, long, help = "Extract several tiles from images much larger than one tile")]
    dynamic: bool,

    #[arg(long, default_value_t = 0.0,
          help = "Stop extracting from an image at the first tile scoring below this (0 disables)")]
    score_threshold: f32,

    #[arg(short, long, help = "Write single-channel tiles")]
    grayscale: bool,

    /// Complexity scorer
    #[arg(long, default_value = "pixelwise", help = "Complexity scorer: pixelwise, learned")]
    scorer: String,

    #[arg(short, long, help = "Worker count for thread and process modes (default: all cores)")]
    workers: Option<usize>,

    #[arg(long, help = "Median-blur before measuring edges (pixel-wise scorer)")]
    denoise: bool,

    #[arg(long, help = "ONNX backbone for the learned scorer")]
    backbone_model: Option<PathBuf>,

    #[arg(long, help = "ONNX regression head for the learned scorer")]
    head_model: Option<PathBuf>,

    #[arg(short, long, help = "Log every tile written")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one image for a process-mode supervisor
    #[command(hide = true)]
    Worker {
        /// JSON-encoded worker request
        #[arg(long)]
        request: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Some(Command::Worker { request }) = &args.command {
        let request: WorkerRequest =
            serde_json::from_str(request).context("Invalid worker request")?;
        let report = run_worker(&request);
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let in_folder = args
        .in_folder
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Missing input folder. Usage: ctile <IN_FOLDER> [OPTIONS]"))?;
    let config = build_config(args, in_folder)?;

    let summary = complexity_tiler::run_batch(config)?;
    println!("Done: {}", summary);
    Ok(())
}

/// Map command-line arguments onto the run configuration
fn build_config(args: Args, in_folder: PathBuf) -> Result<TilingConfig> {
    let scorer: ScorerKind = args.scorer.parse()?;

    let mut config = TilingConfig::new(in_folder, args.out_folder, args.tile_size, scorer);
    config.scale = args.scale;
    config.process_mode = args.process_mode;
    config.dynamic_tile_count = args.dynamic;
    config.score_threshold = args.score_threshold;
    config.grayscale = args.grayscale;
    config.workers = args.workers;
    config.denoise = args.denoise;
    config.backbone_model = args.backbone_model;
    config.head_model = args.head_model;

    config.validate()?;
    Ok(config)
}
