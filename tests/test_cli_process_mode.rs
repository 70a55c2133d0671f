//! The `ctile` binary: command-line runs and process-mode workers.

mod common;

use std::fs;
use std::process::Command;

use common::assertions::{assert_tiles_sized, file_names};
use common::test_images::{create_checkerboard_image, create_patch_image, save};
use complexity_tiler::config::{ProcessMode, ScorerKind, TilingConfig};
use complexity_tiler::io::list_images;
use complexity_tiler::session::BatchSession;
use tempfile::TempDir;

const CTILE: &str = env!("CARGO_BIN_EXE_ctile");

fn input_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    save(&input, "wide.png", &create_patch_image(160, 64, 16, 96, 32));
    save(&input, "square.png", &create_checkerboard_image(64, 64, 4));
    save(&input, "small.png", &create_checkerboard_image(24, 24, 4));
    dir
}

#[test]
fn test_cli_process_mode_run() {
    let dir = input_dir();
    let out = dir.path().join("out");
    let output = Command::new(CTILE)
        .arg(dir.path().join("in"))
        .args(["--out-folder", out.to_str().unwrap()])
        .args(["--tile-size", "32", "--process-mode", "process", "--dynamic"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 processed"), "{}", stdout);

    let names = file_names(&out);
    assert!(names.contains(&"small.png".to_string()));
    assert!(names.contains(&"wide_0.png".to_string()));
    assert!(names.contains(&"square.png".to_string()));
    assert_tiles_sized(&out, 32, &["small.png"]);
}

#[test]
fn test_session_process_mode_isolates_failures() {
    let dir = input_dir();
    let input = dir.path().join("in");
    fs::write(input.join("broken.jpg"), b"\xff\xd8 truncated").unwrap();

    let mut config = TilingConfig::new(&input, dir.path().join("out"), 32, ScorerKind::Pixelwise);
    config.process_mode = ProcessMode::Process;
    config.workers = Some(2);

    let mut session = BatchSession::builder()
        .with_config(config)
        .with_worker_executable(CTILE)
        .build()
        .unwrap();
    let summary = session.run(&list_images(&input).unwrap()).unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped_error, 1);
    assert_eq!(summary.tiles_written, 2);
    assert_eq!(
        file_names(&dir.path().join("out")),
        vec!["small.png", "square.png", "wide.png"]
    );
}

#[test]
fn test_cli_rejects_unknown_scorer() {
    let dir = input_dir();
    let output = Command::new(CTILE)
        .arg(dir.path().join("in"))
        .args(["--out-folder", dir.path().join("out").to_str().unwrap()])
        .args(["--scorer", "sharpness"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown scorer"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_cli_rejects_zero_tile_size() {
    let dir = input_dir();
    let output = Command::new(CTILE)
        .arg(dir.path().join("in"))
        .args(["--out-folder", dir.path().join("out").to_str().unwrap()])
        .args(["--tile-size", "0"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
