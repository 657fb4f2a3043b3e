// 该文件是 Toukui （头盔）项目的一部分。
// src/task/batch.rs - 批量推理
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

use anyhow::Context;
use rand::{Rng, rngs::StdRng};
use tracing::{info, warn};

use crate::bundle::{Bundle, BundleAssembler, BundleRequest, OVERLAY_DIR};
use crate::config::BatchConfig;
use crate::detection::InferenceAdapter;
use crate::naming::{self, RunIdentity};
use crate::overlay::{OverlaySampler, SampleReport};

use super::list_images;

#[derive(Debug)]
pub struct BatchReport {
  pub run: RunIdentity,
  /// 成功推理的图像数
  pub processed: usize,
  pub total_detections: usize,
  /// 推理或保存失败的图像及原因
  pub failed: Vec<(PathBuf, String)>,
  pub overlays: SampleReport,
  pub bundle: Bundle,
}

/// 对一个目录的图像逐张推理，抽样叠加图并打包
pub struct BatchRunner<R = StdRng> {
  adapter: InferenceAdapter,
  sampler: OverlaySampler<R>,
  assembler: BundleAssembler,
  config: BatchConfig,
}

impl<R: Rng> BatchRunner<R> {
  pub fn new(
    adapter: InferenceAdapter,
    sampler: OverlaySampler<R>,
    assembler: BundleAssembler,
    config: BatchConfig,
  ) -> Self {
    Self {
      adapter,
      sampler,
      assembler,
      config,
    }
  }

  pub fn run(&mut self, source: &Path) -> anyhow::Result<BatchReport> {
    let images =
      list_images(source).with_context(|| format!("无法读取输入目录 {}", source.display()))?;
    info!("{} 中共有 {} 张图像", source.display(), images.len());

    let run = naming::next_available_directory(&self.config.runs_root, &self.config.run_prefix)?;
    info!("运行目录: {}", run.run_directory.display());

    // 逐张推理并保存，叠加图抽样只保留被选中的结果
    let run_dir = run.run_directory.clone();
    let adapter = &self.adapter;
    let mut failed = Vec::new();
    let mut processed = 0;
    let mut total_detections = 0;
    let predictions = images.into_iter().filter_map(|image| {
      let prediction = match adapter.predict_path(&image) {
        Ok(prediction) => prediction,
        Err(e) => {
          warn!("推理失败，跳过: {}", e);
          failed.push((image, e.to_string()));
          return None;
        }
      };

      // 保留原文件名，避免同名不同扩展名的图像互相覆盖
      let saved = run_dir.join(image.file_name()?);
      if let Err(e) = prediction.annotated.save(&saved) {
        warn!("保存 {} 失败: {}", saved.display(), e);
        failed.push((image, e.to_string()));
        return None;
      }

      processed += 1;
      total_detections += prediction.detections.len();
      Some(prediction)
    });

    let overlay_dir = run.run_directory.join(OVERLAY_DIR);
    let overlays = self
      .sampler
      .sample(predictions, self.config.n_samples, &overlay_dir)?;
    info!(
      "推理完成: 成功 {} 张，失败 {} 张，共 {} 个目标",
      processed,
      failed.len(),
      total_detections
    );

    let bundle = self.assembler.assemble(&BundleRequest {
      weights_dir: self.config.weights_dir.clone(),
      overlays_dir: overlay_dir,
      training_results_dir: self.config.training_results_dir.clone(),
      name: run.run_id.clone(),
      output_root: self.config.bundle_root.clone(),
    })?;

    Ok(BatchReport {
      run,
      processed,
      total_detections,
      failed,
      overlays,
      bundle,
    })
  }
}
