// 该文件是 Toukui （头盔）项目的一部分。
// src/naming.rs - 产物命名与运行目录分配
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

use thiserror::Error;
use tracing::debug;

/// 标识符长度（截断后的 UUID 十六进制字符数）
pub const IDENTIFIER_LEN: usize = 8;

/// 单个基础目录下最多探测的运行目录数量
const MAX_RUN_SLOTS: usize = 10_000;

#[derive(Error, Debug)]
pub enum NamingError {
  #[error("非法文件名: {0:?}")]
  InvalidName(String),
  #[error("无法创建运行目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("{base} 下 {prefix}* 运行目录已耗尽")]
  Exhausted { base: PathBuf, prefix: String },
}

/// 产物角色，决定文件名后缀与扩展名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
  /// 服务端保存的原始上传
  Upload,
  /// 服务端保存的标注结果
  Result,
  /// 批量推理抽样的叠加图
  Overlay,
  /// 打包归档
  Bundle,
  /// 打包目录中的说明文件
  Manifest,
  /// 训练指标表
  MetricsTable,
  LossChart,
  ValChart,
}

impl ArtifactRole {
  pub fn extension(self) -> &'static str {
    match self {
      ArtifactRole::Upload | ArtifactRole::Result | ArtifactRole::Overlay => "jpg",
      ArtifactRole::Bundle => "zip",
      ArtifactRole::Manifest => "txt",
      ArtifactRole::MetricsTable => "csv",
      ArtifactRole::LossChart | ArtifactRole::ValChart => "png",
    }
  }

  /// 打包目录内的单例文件，文件名与标识符无关
  pub fn is_singleton(self) -> bool {
    matches!(
      self,
      ArtifactRole::Manifest
        | ArtifactRole::MetricsTable
        | ArtifactRole::LossChart
        | ArtifactRole::ValChart
    )
  }

  fn stem(self) -> &'static str {
    match self {
      ArtifactRole::Upload => "",
      ArtifactRole::Result => "result",
      ArtifactRole::Overlay => "overlay",
      ArtifactRole::Bundle => "bundle",
      ArtifactRole::Manifest => "readme",
      ArtifactRole::MetricsTable => "results",
      ArtifactRole::LossChart => "loss_metrics",
      ArtifactRole::ValChart => "val_metrics",
    }
  }

  /// 给定标识符下该角色的文件名
  pub fn file_name(self, identifier: &str) -> String {
    if self.is_singleton() {
      format!("{}.{}", self.stem(), self.extension())
    } else if self.stem().is_empty() {
      format!("{}.{}", identifier, self.extension())
    } else {
      format!("{}_{}.{}", identifier, self.stem(), self.extension())
    }
  }
}

/// 生成一个短的随机标识符
pub fn new_identifier() -> String {
  let mut id = uuid::Uuid::new_v4().simple().to_string();
  id.truncate(IDENTIFIER_LEN);
  id
}

/// `{base}/{identifier}_{role}.{ext}`，单例角色为 `{base}/{role}.{ext}`
pub fn output_path(base: &Path, identifier: &str, role: ArtifactRole) -> PathBuf {
  base.join(role.file_name(identifier))
}

/// 打包目录 `{root}/{name}_bundle`
pub fn bundle_directory(root: &Path, name: &str) -> PathBuf {
  root.join(format!("{}_bundle", name))
}

/// 检查文件名只包含单个路径分量
pub fn validate_file_name(name: &str) -> Result<(), NamingError> {
  let invalid = name.is_empty()
    || name == "."
    || name.contains("..")
    || name.contains('/')
    || name.contains('\\')
    || name.contains('\0');
  if invalid {
    return Err(NamingError::InvalidName(name.to_string()));
  }
  Ok(())
}

/// 一次批量推理或训练的运行标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
  pub run_id: String,
  pub run_directory: PathBuf,
}

/// 依次探测 `prefix`, `prefix2`, `prefix3` ... 并创建第一个不存在的目录
///
/// 使用 `create_dir` 占位，已存在的目录不会被复用。
pub fn next_available_directory(base: &Path, prefix: &str) -> Result<RunIdentity, NamingError> {
  std::fs::create_dir_all(base).map_err(|source| NamingError::CreateDir {
    path: base.to_path_buf(),
    source,
  })?;

  for slot in 1..=MAX_RUN_SLOTS {
    let run_id = if slot == 1 {
      prefix.to_string()
    } else {
      format!("{}{}", prefix, slot)
    };
    let candidate = base.join(&run_id);
    match std::fs::create_dir(&candidate) {
      Ok(()) => {
        debug!("分配运行目录: {}", candidate.display());
        return Ok(RunIdentity {
          run_id,
          run_directory: candidate,
        });
      }
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
      Err(source) => {
        return Err(NamingError::CreateDir {
          path: candidate,
          source,
        });
      }
    }
  }

  Err(NamingError::Exhausted {
    base: base.to_path_buf(),
    prefix: prefix.to_string(),
  })
}
