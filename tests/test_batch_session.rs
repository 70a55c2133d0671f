//! Batch orchestration: idempotent re-runs, thread-mode output counts,
//! failure isolation and the learned scorer's quality floor.

mod common;

use std::fs;

use common::assertions::{assert_tiles_sized, file_names};
use common::mock_model::ScriptedModel;
use common::test_images::{create_checkerboard_image, create_patch_image, save};
use complexity_tiler::config::{ProcessMode, ScorerKind, TilingConfig};
use complexity_tiler::io::list_images;
use complexity_tiler::session::BatchSession;
use tempfile::TempDir;

fn setup() -> (TempDir, TilingConfig) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("in")).unwrap();
    let config = TilingConfig::new(
        dir.path().join("in"),
        dir.path().join("out"),
        32,
        ScorerKind::Pixelwise,
    );
    (dir, config)
}

#[test]
fn test_second_run_skips_everything() {
    let (dir, mut config) = setup();
    let input = dir.path().join("in");
    save(&input, "a.png", &create_checkerboard_image(80, 80, 6));
    save(&input, "b.png", &create_patch_image(200, 120, 40, 60, 32));
    save(&input, "c.png", &create_checkerboard_image(20, 20, 2));
    config.dynamic_tile_count = true;
    config.process_mode = ProcessMode::Sequential;
    let paths = list_images(&input).unwrap();

    let first = BatchSession::builder()
        .with_config(config.clone())
        .build()
        .unwrap()
        .run(&paths)
        .unwrap();
    assert_eq!(first.processed, 3);
    assert_eq!(first.skipped_existing, 0);
    let written = file_names(&dir.path().join("out"));

    let second = BatchSession::builder()
        .with_config(config)
        .build()
        .unwrap()
        .run(&paths)
        .unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_existing, 3);
    assert_eq!(second.tiles_written, 0);
    assert_eq!(file_names(&dir.path().join("out")), written);
}

#[test]
fn test_thread_mode_writes_one_output_per_image() {
    let (dir, mut config) = setup();
    let input = dir.path().join("in");
    for i in 0..12 {
        let img = create_patch_image(96, 64, (i % 3) * 16, (i % 4) * 16, 24);
        save(&input, &format!("img{:02}.png", i), &img);
    }
    save(&input, "tiny.png", &create_checkerboard_image(16, 40, 4));
    config.process_mode = ProcessMode::Thread;
    config.workers = Some(4);

    let mut session = BatchSession::builder().with_config(config).build().unwrap();
    assert_eq!(session.mode(), ProcessMode::Thread);
    let summary = session.run(&list_images(&input).unwrap()).unwrap();

    assert_eq!(summary.processed, 13);
    assert_eq!(summary.tiles_written, 12);
    let out = dir.path().join("out");
    let names = file_names(&out);
    assert_eq!(names.len(), 13);
    for i in 0..12 {
        assert!(names.contains(&format!("img{:02}.png", i)));
    }
    assert!(names.contains(&"tiny.png".to_string()));
    assert_tiles_sized(&out, 32, &["tiny.png"]);
}

#[test]
fn test_corrupt_image_is_skipped_and_counted() {
    let (dir, mut config) = setup();
    let input = dir.path().join("in");
    save(&input, "good.png", &create_checkerboard_image(64, 64, 4));
    fs::write(input.join("bad.png"), b"definitely not a png").unwrap();
    config.process_mode = ProcessMode::Thread;

    let summary = BatchSession::builder()
        .with_config(config)
        .build()
        .unwrap()
        .run(&list_images(&input).unwrap())
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped_error, 1);
    assert_eq!(file_names(&dir.path().join("out")), vec!["good.png"]);
}

#[test]
fn test_learned_threshold_writes_two_indexed_tiles() {
    let (dir, mut config) = setup();
    let input = dir.path().join("in");
    save(&input, "scan.png", &create_checkerboard_image(128, 128, 4));
    config.scorer = ScorerKind::Learned;
    config.tile_size = 32;
    config.dynamic_tile_count = true;
    config.score_threshold = 0.1;

    let mut session = BatchSession::builder()
        .with_config(config)
        .with_learned_model(Box::new(ScriptedModel::new(&[0.5, 0.3, 0.02])))
        .build()
        .unwrap();
    assert_eq!(session.mode(), ProcessMode::Sequential);
    let summary = session.run(&list_images(&input).unwrap()).unwrap();

    assert_eq!(summary.tiles_written, 2);
    assert_eq!(
        file_names(&dir.path().join("out")),
        vec!["scan_0.png", "scan_1.png"]
    );
}

#[test]
fn test_grayscale_tiles_are_single_channel() {
    let (dir, mut config) = setup();
    let input = dir.path().join("in");
    save(&input, "color.png", &create_checkerboard_image(64, 64, 4));
    config.grayscale = true;
    config.process_mode = ProcessMode::Sequential;

    BatchSession::builder()
        .with_config(config)
        .build()
        .unwrap()
        .run(&list_images(&input).unwrap())
        .unwrap();

    let tile = image::open(dir.path().join("out/color.png")).unwrap();
    assert_eq!(tile.color().channel_count(), 1);
}

#[test]
fn test_invalid_configuration_is_fatal() {
    let (_dir, mut config) = setup();
    config.scale = 0;
    let err = BatchSession::builder().with_config(config).build().err().unwrap();
    assert!(err.is_fatal());
    assert_eq!(err.category(), "config");
}
