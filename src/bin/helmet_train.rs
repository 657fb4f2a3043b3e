// 该文件是 Toukui （头盔）项目的一部分。
// src/bin/helmet_train.rs - 训练并提升最优权重
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use toukui::{
  config::{DEFAULT_BUNDLE_ROOT, TrainConfig},
  draw::load_font,
  metrics::MetricsPlotter,
  task::{TrainRequest, TrainingDriver, UltralyticsCli},
};

/// 训练参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集 YAML
  #[arg(long, value_name = "FILE", default_value = "data/data.yaml")]
  pub data: PathBuf,
  /// 训练轮数
  #[arg(long, default_value_t = 50)]
  pub epochs: u32,
  /// 训练图像尺寸
  #[arg(long, default_value_t = 640)]
  pub img: u32,
  /// 预训练权重
  #[arg(long, default_value = "yolov8s.pt")]
  pub weights: String,
  /// 训练输出目录
  #[arg(long, default_value = "train/helmet_yolov8")]
  pub project: PathBuf,
  /// 最优权重提升到 model/<family>/best.pt
  #[arg(long, default_value = "yolov8")]
  pub family: String,
  /// 轻量包输出目录
  #[arg(long, default_value = DEFAULT_BUNDLE_ROOT)]
  pub bundle_root: PathBuf,
  /// ultralytics 命令行程序
  #[arg(long, env = "TOUKUI_YOLO_BIN", default_value = "yolo")]
  pub yolo_bin: String,
  /// 曲线字体（TrueType）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  toukui::logging::init_tracing();

  let args = Args::parse();

  info!("数据集: {}", args.data.display());
  info!("训练轮数: {}", args.epochs);
  info!("图像尺寸: {}", args.img);
  info!("预训练权重: {}", args.weights);

  let config = TrainConfig {
    project_dir: args.project,
    family: args.family,
    bundle_root: args.bundle_root,
    ..TrainConfig::default()
  };
  let plotter = MetricsPlotter::new(load_font(args.font.as_deref()));
  let driver = TrainingDriver::new(UltralyticsCli::new(args.yolo_bin), plotter, config);

  let report = driver.run(&TrainRequest {
    data: args.data,
    epochs: args.epochs,
    img_size: args.img,
    weights: args.weights,
  })?;

  info!("训练结果: {}", report.run.run_directory.display());
  if let Some(promoted) = &report.promoted {
    info!("最优权重: {}", promoted.display());
  }
  info!("轻量包: {}", report.bundle.archive_path.display());

  Ok(())
}
