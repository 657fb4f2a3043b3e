// 该文件是 Toukui （头盔）项目的一部分。
// src/overlay.rs - 预测叠加图抽样
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use image::ImageFormat;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IteratorRandom};
use thiserror::Error;
use tracing::{info, warn};

use crate::detection::PredictionResult;
use crate::naming::{self, ArtifactRole};

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("无法创建叠加图目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("叠加图渲染失败 {path}: {source}")]
  Render {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 抽样结果
#[derive(Debug, Default)]
pub struct SampleReport {
  /// 被选中的源图像
  pub selected: Vec<PathBuf>,
  /// 成功写出的叠加图
  pub written: Vec<PathBuf>,
  /// 单张写出失败，已跳过
  pub failures: Vec<OverlayError>,
}

impl SampleReport {
  pub fn success_count(&self) -> usize {
    self.written.len()
  }

  pub fn failure_count(&self) -> usize {
    self.failures.len()
  }
}

/// 从预测结果中随机选取至多 N 张写出叠加图
pub struct OverlaySampler<R = StdRng> {
  rng: R,
}

impl Default for OverlaySampler<StdRng> {
  fn default() -> Self {
    Self::new()
  }
}

impl OverlaySampler<StdRng> {
  pub fn new() -> Self {
    Self {
      rng: StdRng::from_entropy(),
    }
  }

  pub fn seeded(seed: u64) -> Self {
    Self {
      rng: StdRng::seed_from_u64(seed),
    }
  }
}

impl<R: Rng> OverlaySampler<R> {
  pub fn with_rng(rng: R) -> Self {
    Self { rng }
  }

  /// 无放回均匀选取 `min(max_count, len)` 个元素，按源路径排序
  ///
  /// 逐个消费输入，只保留被选中的元素。
  pub fn select<I>(&mut self, predictions: I, max_count: usize) -> Vec<PredictionResult>
  where
    I: IntoIterator<Item = PredictionResult>,
  {
    let mut selected = predictions
      .into_iter()
      .choose_multiple(&mut self.rng, max_count);
    selected.sort_by(|a, b| a.source.cmp(&b.source));
    selected
  }

  /// 选取并写出 `overlay_dir/{源文件名}_overlay.jpg`
  ///
  /// 目录总会被创建，即使没有选中任何图像；单张失败只记录并跳过；
  /// 目录无法创建时整体失败。
  pub fn sample<I>(
    &mut self,
    predictions: I,
    max_count: usize,
    overlay_dir: &Path,
  ) -> Result<SampleReport, OverlayError>
  where
    I: IntoIterator<Item = PredictionResult>,
  {
    std::fs::create_dir_all(overlay_dir).map_err(|source| OverlayError::CreateDir {
      path: overlay_dir.to_path_buf(),
      source,
    })?;

    let selected = self.select(predictions, max_count);
    let mut report = SampleReport::default();

    for prediction in selected {
      report.selected.push(prediction.source.clone());
      let path = naming::output_path(overlay_dir, &prediction.source_stem(), ArtifactRole::Overlay);
      match prediction
        .annotated
        .save_with_format(&path, ImageFormat::Jpeg)
      {
        Ok(()) => report.written.push(path),
        Err(source) => {
          let err = OverlayError::Render { path, source };
          warn!("{}，跳过", err);
          report.failures.push(err);
        }
      }
    }

    info!(
      "{} 张叠加图已保存到 {}（失败 {} 张）",
      report.success_count(),
      overlay_dir.display(),
      report.failure_count()
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn predictions(n: usize) -> Vec<PredictionResult> {
    (0..n)
      .map(|i| PredictionResult {
        source: PathBuf::from(format!("images/img_{:03}.png", i)),
        detections: Vec::new(),
        annotated: RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])),
      })
      .collect()
  }

  #[test]
  fn select_is_bounded_and_distinct() {
    let preds = predictions(5);
    let mut sampler = OverlaySampler::seeded(7);
    for n in [0, 1, 3, 5, 50] {
      let picked = sampler.select(preds.iter().cloned(), n);
      assert_eq!(picked.len(), n.min(5));
      let mut sources: Vec<_> = picked.iter().map(|p| p.source.clone()).collect();
      assert!(sources.windows(2).all(|w| w[0] < w[1]));
      sources.dedup();
      assert_eq!(sources.len(), n.min(5));
    }
  }

  #[test]
  fn sample_writes_overlays() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("pred_overlays");
    let preds = predictions(4);
    let report = OverlaySampler::seeded(1).sample(preds, 2, &dir).unwrap();
    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 0);
    for path in &report.written {
      let name = path.file_name().unwrap().to_string_lossy();
      assert!(name.starts_with("img_") && name.ends_with("_overlay.jpg"));
      assert!(path.is_file());
    }
  }

  #[test]
  fn zero_samples_create_empty_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sampler = OverlaySampler::seeded(3);

    let dir = tmp.path().join("pred_overlays");
    for _ in 0..2 {
      let report = sampler.sample(predictions(3), 0, &dir).unwrap();
      assert_eq!(report.success_count(), 0);
      assert!(report.selected.is_empty());
    }
    assert!(dir.is_dir());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

    let empty = tmp.path().join("no_predictions");
    let report = sampler.sample(Vec::new(), 5, &empty).unwrap();
    assert_eq!(report.success_count(), 0);
    assert!(empty.is_dir());
  }

  #[test]
  fn streamed_input_is_fully_consumed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut consumed = 0;
    let stream = predictions(20).into_iter().inspect(|_| consumed += 1);
    let report = OverlaySampler::seeded(11)
      .sample(stream, 3, &tmp.path().join("pred_overlays"))
      .unwrap();
    assert_eq!(consumed, 20);
    assert_eq!(report.success_count(), 3);
  }

  #[test]
  fn failed_write_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("pred_overlays");
    std::fs::create_dir_all(dir.join("img_000_overlay.jpg")).unwrap();
    let preds = predictions(2);
    let report = OverlaySampler::seeded(5).sample(preds, 2, &dir).unwrap();
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 1);
  }
}
