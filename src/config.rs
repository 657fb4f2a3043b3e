// 该文件是 Toukui （头盔）项目的一部分。
// src/config.rs - 运行配置
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

use url::Url;

use crate::detection::DEFAULT_CONFIDENCE;

pub const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_BUNDLE_ROOT: &str = "Light_Bundles";
pub const DEFAULT_RUN_PREFIX: &str = "exp";

/// 推理服务配置
#[derive(Debug, Clone)]
pub struct ServeConfig {
  pub uploads_dir: PathBuf,
  pub results_dir: PathBuf,
  /// `result_url` 的前缀
  pub public_url: Url,
  pub confidence: f32,
  pub max_upload_bytes: usize,
}

impl Default for ServeConfig {
  fn default() -> Self {
    Self {
      uploads_dir: PathBuf::from("app/uploads"),
      results_dir: PathBuf::from("app/results"),
      public_url: Url::parse(DEFAULT_PUBLIC_URL).expect("默认地址有效"),
      confidence: DEFAULT_CONFIDENCE,
      max_upload_bytes: 32 * 1024 * 1024,
    }
  }
}

/// 批量推理配置
#[derive(Debug, Clone)]
pub struct BatchConfig {
  pub runs_root: PathBuf,
  pub run_prefix: String,
  pub bundle_root: PathBuf,
  pub n_samples: usize,
  /// 打包时收集 best.pt / last.pt 的目录
  pub weights_dir: PathBuf,
  /// 打包时收集 results.csv 的目录
  pub training_results_dir: PathBuf,
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      runs_root: PathBuf::from("runs/detect"),
      run_prefix: DEFAULT_RUN_PREFIX.to_string(),
      bundle_root: PathBuf::from(DEFAULT_BUNDLE_ROOT),
      n_samples: 10,
      weights_dir: PathBuf::from("model/yolov11"),
      training_results_dir: PathBuf::from("model"),
    }
  }
}

/// 训练配置
#[derive(Debug, Clone)]
pub struct TrainConfig {
  pub project_dir: PathBuf,
  pub run_prefix: String,
  /// 最优权重提升目录 `{model_root}/{family}/best.pt`
  pub model_root: PathBuf,
  pub family: String,
  pub bundle_root: PathBuf,
}

impl Default for TrainConfig {
  fn default() -> Self {
    Self {
      project_dir: PathBuf::from("train/helmet_yolov8"),
      run_prefix: DEFAULT_RUN_PREFIX.to_string(),
      model_root: PathBuf::from("model"),
      family: "yolov8".to_string(),
      bundle_root: PathBuf::from(DEFAULT_BUNDLE_ROOT),
    }
  }
}

impl TrainConfig {
  pub fn promoted_weights(&self) -> PathBuf {
    self.model_root.join(&self.family).join("best.pt")
  }
}
