// 该文件是 Toukui （头盔）项目的一部分。
// src/bin/helmet_detect.rs - 批量推理并生成轻量包
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use toukui::{
  bundle::BundleAssembler,
  config::{BatchConfig, DEFAULT_BUNDLE_ROOT},
  detection::{DEFAULT_CONFIDENCE, InferenceAdapter, LabelTable, load_detector},
  draw::{Draw, load_font},
  metrics::MetricsPlotter,
  overlay::OverlaySampler,
  task::BatchRunner,
};

/// 批量推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型权重路径（`.pt` 对应同目录下导出的 `.onnx`）
  #[arg(long, value_name = "FILE", default_value = "model/yolov11/best.pt")]
  pub weights: PathBuf,
  /// 测试图像目录
  #[arg(long, value_name = "DIR", default_value = "data/images/test")]
  pub source: PathBuf,
  /// 保存的叠加图数量
  #[arg(long = "n_samples", default_value_t = 10)]
  pub n_samples: usize,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
  pub conf: f32,
  /// 训练结果目录（results.csv 所在），默认为权重目录的上一级
  #[arg(long, value_name = "DIR")]
  pub train_results: Option<PathBuf>,
  /// 运行目录根
  #[arg(long, default_value = "runs/detect")]
  pub runs_root: PathBuf,
  /// 轻量包输出目录
  #[arg(long, default_value = DEFAULT_BUNDLE_ROOT)]
  pub bundle_root: PathBuf,
  /// 抽样随机种子
  #[arg(long)]
  pub seed: Option<u64>,
  /// 标注字体（TrueType）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  toukui::logging::init_tracing();

  let args = Args::parse();

  info!("模型文件路径: {}", args.weights.display());
  info!("输入目录: {}", args.source.display());
  info!("叠加图数量: {}", args.n_samples);

  let detector = load_detector(&args.weights, LabelTable::helmet())
    .with_context(|| format!("无法加载模型 {}", args.weights.display()))?;
  let font = load_font(args.font.as_deref());
  let adapter =
    InferenceAdapter::new(detector, Draw::new(font.clone())).with_confidence(args.conf);

  let weights_dir = args
    .weights
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_default();
  let training_results_dir = args.train_results.unwrap_or_else(|| {
    weights_dir
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default()
  });
  let config = BatchConfig {
    runs_root: args.runs_root,
    bundle_root: args.bundle_root,
    n_samples: args.n_samples,
    weights_dir,
    training_results_dir,
    ..BatchConfig::default()
  };

  let sampler = match args.seed {
    Some(seed) => OverlaySampler::seeded(seed),
    None => OverlaySampler::new(),
  };
  let assembler = BundleAssembler::new(MetricsPlotter::new(font));
  let mut runner = BatchRunner::new(adapter, sampler, assembler, config);

  let report = runner.run(&args.source)?;
  for (image, reason) in &report.failed {
    warn!("未处理: {} ({})", image.display(), reason);
  }

  info!("处理完成!");
  info!("运行目录: {}", report.run.run_directory.display());
  info!("处理图像: {}", report.processed);
  info!("总检测数: {}", report.total_detections);
  info!(
    "叠加图: {} 张（失败 {} 张）",
    report.overlays.success_count(),
    report.overlays.failure_count()
  );
  info!("轻量包: {}", report.bundle.archive_path.display());

  Ok(())
}
