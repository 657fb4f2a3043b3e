mod common;

use std::path::Path;

use tempfile::TempDir;

use common::*;
use toukui::{
  bundle::BundleAssembler,
  config::BatchConfig,
  detection::InferenceAdapter,
  draw::Draw,
  overlay::OverlaySampler,
  task::BatchRunner,
};

/// 三张可读图像、一张损坏图像，a.jpg 带检测记录
fn prepare_source(dir: &Path) -> std::path::PathBuf {
  let source = dir.join("images");
  write_black_jpeg(&source, "a.jpg", 32, 32);
  write_black_jpeg(&source, "b.jpg", 32, 32);
  write_black_jpeg(&source, "c.png", 32, 32);
  std::fs::write(source.join("broken.jpg"), b"garbage").unwrap();
  std::fs::write(
    source.join("a.txt"),
    "helmet, 0.9, 2, 2, 12, 12\n1, 0.6, 14, 14, 30, 30\nno_helmet, 0.1, 1, 1, 3, 3\n",
  )
  .unwrap();
  source
}

fn runner(dir: &Path, n_samples: usize) -> BatchRunner {
  let weights_dir = dir.join("model/yolov11");
  write_weights(&weights_dir, "best.pt");
  write_results_csv(&dir.join("model"));

  let adapter = InferenceAdapter::new(Box::new(SidecarDetector::new()), Draw::default());
  let config = BatchConfig {
    runs_root: dir.join("runs/detect"),
    bundle_root: dir.join("Light_Bundles"),
    n_samples,
    weights_dir,
    training_results_dir: dir.join("model"),
    ..BatchConfig::default()
  };
  BatchRunner::new(
    adapter,
    OverlaySampler::seeded(7),
    BundleAssembler::default(),
    config,
  )
}

#[test]
fn batch_run_predicts_samples_and_bundles() -> anyhow::Result<()> {
  let dir = TempDir::new()?;
  let source = prepare_source(dir.path());
  let mut runner = runner(dir.path(), 2);

  let report = runner.run(&source)?;

  assert_eq!(report.run.run_id, "exp");
  assert_eq!(report.run.run_directory, dir.path().join("runs/detect/exp"));
  assert_eq!(report.processed, 3);
  assert_eq!(report.total_detections, 2);
  assert_eq!(report.failed.len(), 1);
  assert!(report.failed[0].0.ends_with("broken.jpg"));

  for name in ["a.jpg", "b.jpg", "c.png"] {
    assert!(report.run.run_directory.join(name).is_file(), "{name}");
  }
  assert!(!report.run.run_directory.join("c.jpg").exists());

  let overlay_dir = report.run.run_directory.join("pred_overlays");
  assert_eq!(report.overlays.success_count(), 2);
  assert_eq!(count_files(&overlay_dir), 2);

  let entries = zip_entries(&report.bundle.archive_path);
  assert_eq!(
    report.bundle.archive_path,
    dir.path().join("Light_Bundles/exp_bundle.zip")
  );
  assert_eq!(
    entries.iter().filter(|e| e.starts_with("pred_overlays/")).count(),
    2
  );
  assert!(entries.contains(&"best.pt".to_string()));
  assert!(entries.contains(&"results.csv".to_string()));
  assert!(entries.contains(&"val_metrics.png".to_string()));
  Ok(())
}

#[test]
fn repeated_runs_get_fresh_directories() -> anyhow::Result<()> {
  let dir = TempDir::new()?;
  let source = prepare_source(dir.path());
  let mut runner = runner(dir.path(), 1);

  let first = runner.run(&source)?;
  let second = runner.run(&source)?;

  assert_eq!(first.run.run_id, "exp");
  assert_eq!(second.run.run_id, "exp2");
  assert!(dir.path().join("Light_Bundles/exp2_bundle.zip").is_file());
  Ok(())
}

#[test]
fn overlay_count_is_bounded_by_images() -> anyhow::Result<()> {
  let dir = TempDir::new()?;
  let source = prepare_source(dir.path());
  let mut runner = runner(dir.path(), 50);

  let report = runner.run(&source)?;
  assert_eq!(report.overlays.success_count(), report.processed);
  Ok(())
}

#[test]
fn same_stem_images_keep_their_own_files() -> anyhow::Result<()> {
  let dir = TempDir::new()?;
  let source = dir.path().join("images");
  write_black_jpeg(&source, "a.jpg", 32, 32);
  image::RgbImage::from_pixel(24, 16, image::Rgb([255, 255, 255]))
    .save(source.join("a.png"))?;
  let mut runner = runner(dir.path(), 0);

  let report = runner.run(&source)?;
  assert_eq!(report.processed, 2);
  let jpg = image::open(report.run.run_directory.join("a.jpg"))?;
  let png = image::open(report.run.run_directory.join("a.png"))?;
  assert_eq!((jpg.width(), jpg.height()), (32, 32));
  assert_eq!((png.width(), png.height()), (24, 16));
  Ok(())
}

#[test]
fn zero_samples_writes_empty_overlay_directory() -> anyhow::Result<()> {
  let dir = TempDir::new()?;
  let source = prepare_source(dir.path());
  let mut runner = runner(dir.path(), 0);

  let report = runner.run(&source)?;
  let overlay_dir = report.run.run_directory.join("pred_overlays");
  assert!(overlay_dir.is_dir());
  assert_eq!(count_files(&overlay_dir), 0);
  assert_eq!(report.overlays.success_count(), 0);
  assert!(report.bundle.overlays_included);
  assert!(
    !zip_entries(&report.bundle.archive_path)
      .iter()
      .any(|e| e.starts_with("pred_overlays/"))
  );
  Ok(())
}

#[test]
fn missing_source_directory_fails() {
  let dir = TempDir::new().unwrap();
  let mut runner = runner(dir.path(), 1);
  assert!(runner.run(&dir.path().join("nope")).is_err());
}
