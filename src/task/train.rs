// 该文件是 Toukui （头盔）项目的一部分。
// src/task/train.rs - 训练驱动
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
use std::process::{Command, ExitStatus};

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::bundle::{Bundle, BundleAssembler, BundleRequest, OVERLAY_DIR};
use crate::config::TrainConfig;
use crate::metrics::{MetricsPlotter, PlotOutcome};
use crate::naming::{self, ArtifactRole, RunIdentity};

#[derive(Error, Debug)]
pub enum TrainError {
  #[error("无法启动训练程序 {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("训练程序异常退出: {0}")]
  Failed(ExitStatus),
}

#[derive(Debug, Clone)]
pub struct TrainRequest {
  /// 数据集 YAML
  pub data: PathBuf,
  pub epochs: u32,
  pub img_size: u32,
  /// 预训练权重
  pub weights: String,
}

/// 外部训练能力，将结果写入给定的运行目录
pub trait Trainer {
  type Error: std::error::Error + Send + Sync + 'static;

  fn train(&self, request: &TrainRequest, run: &RunIdentity) -> Result<(), Self::Error>;
}

/// 调用 ultralytics `yolo` 命令行训练
#[derive(Debug, Clone)]
pub struct UltralyticsCli {
  program: String,
  batch: u32,
  patience: u32,
  amp: bool,
}

impl Default for UltralyticsCli {
  fn default() -> Self {
    Self::new("yolo")
  }
}

impl UltralyticsCli {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      batch: 16,
      patience: 15,
      amp: true,
    }
  }

  /// 命令行参数；运行目录已预先分配，因此允许复用
  pub fn args(&self, request: &TrainRequest, run: &RunIdentity) -> Vec<String> {
    let project = run
      .run_directory
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();
    let flag = |v: bool| if v { "True" } else { "False" };
    vec![
      "detect".to_string(),
      "train".to_string(),
      format!("data={}", request.data.display()),
      format!("epochs={}", request.epochs),
      format!("imgsz={}", request.img_size),
      format!("model={}", request.weights),
      format!("batch={}", self.batch),
      format!("amp={}", flag(self.amp)),
      format!("patience={}", self.patience),
      format!("project={}", project.display()),
      format!("name={}", run.run_id),
      "exist_ok=True".to_string(),
    ]
  }
}

impl Trainer for UltralyticsCli {
  type Error = TrainError;

  fn train(&self, request: &TrainRequest, run: &RunIdentity) -> Result<(), Self::Error> {
    let args = self.args(request, run);
    info!("执行训练: {} {}", self.program, args.join(" "));
    let status = Command::new(&self.program)
      .args(&args)
      .status()
      .map_err(|source| TrainError::Spawn {
        program: self.program.clone(),
        source,
      })?;
    if !status.success() {
      return Err(TrainError::Failed(status));
    }
    Ok(())
  }
}

#[derive(Debug)]
pub struct TrainReport {
  pub run: RunIdentity,
  pub plots: PlotOutcome,
  /// 提升后的最优权重路径，缺少 best.pt 时为 `None`
  pub promoted: Option<PathBuf>,
  pub bundle: Bundle,
}

/// 训练、绘图、提升最优权重并打包
pub struct TrainingDriver<T> {
  trainer: T,
  plotter: MetricsPlotter,
  assembler: BundleAssembler,
  config: TrainConfig,
}

impl<T: Trainer> TrainingDriver<T> {
  pub fn new(trainer: T, plotter: MetricsPlotter, config: TrainConfig) -> Self {
    Self {
      trainer,
      assembler: BundleAssembler::new(plotter.clone()),
      plotter,
      config,
    }
  }

  pub fn run(&self, request: &TrainRequest) -> anyhow::Result<TrainReport> {
    let run = naming::next_available_directory(&self.config.project_dir, &self.config.run_prefix)?;
    info!("训练运行目录: {}", run.run_directory.display());

    self
      .trainer
      .train(request, &run)
      .context("训练失败")?;
    info!("训练完成，结果保存在 {}", run.run_directory.display());

    let results_csv = naming::output_path(&run.run_directory, "", ArtifactRole::MetricsTable);
    let plots = match self.plotter.plot(&results_csv, &run.run_directory) {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!("绘制训练曲线失败: {}", e);
        PlotOutcome::Skipped
      }
    };

    let weights_dir = run.run_directory.join("weights");
    let promoted = self.promote(&weights_dir.join("best.pt"))?;

    let bundle = self.assembler.assemble(&BundleRequest {
      weights_dir,
      overlays_dir: run.run_directory.join(OVERLAY_DIR),
      training_results_dir: run.run_directory.clone(),
      name: run.run_id.clone(),
      output_root: self.config.bundle_root.clone(),
    })?;

    Ok(TrainReport {
      run,
      plots,
      promoted,
      bundle,
    })
  }

  fn promote(&self, best: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !best.is_file() {
      warn!("{} 不存在，跳过权重提升", best.display());
      return Ok(None);
    }
    let target = self.config.promoted_weights();
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("无法创建目录 {}", parent.display()))?;
    }
    std::fs::copy(best, &target)
      .with_context(|| format!("无法复制 {} 到 {}", best.display(), target.display()))?;
    info!("最优权重已复制到 {}", target.display());
    Ok(Some(target))
  }
}
