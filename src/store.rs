// 该文件是 Toukui （头盔）项目的一部分。
// src/store.rs - 推理结果存储
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

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{info, warn};

use crate::naming::{self, ArtifactRole, NamingError};

const MAX_IDENTIFIER_ATTEMPTS: usize = 8;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("非法文件名: {0:?}")]
  InvalidName(String),
  #[error("结果不存在: {0}")]
  NotFound(String),
  #[error("写入失败 {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("I/O 错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl From<NamingError> for StoreError {
  fn from(err: NamingError) -> Self {
    match err {
      NamingError::InvalidName(name) => StoreError::InvalidName(name),
      NamingError::CreateDir { path, source } => StoreError::Io { path, source },
      NamingError::Exhausted { base, .. } => StoreError::Io {
        path: base,
        source: std::io::Error::other("标识符已耗尽"),
      },
    }
  }
}

/// 服务端标注结果目录
///
/// 每个请求使用独立标识符，互不加锁；同一标识符重复保存时后写覆盖先写。
#[derive(Debug, Clone)]
pub struct ResultStore {
  root: PathBuf,
}

impl ResultStore {
  /// 打开结果目录，不存在时创建
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let root = root.into();
    std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
      path: root.clone(),
      source,
    })?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// 分配一个尚未被结果文件占用的标识符
  pub fn allocate_identifier(&self) -> String {
    for _ in 0..MAX_IDENTIFIER_ATTEMPTS {
      let id = naming::new_identifier();
      if !naming::output_path(&self.root, &id, ArtifactRole::Result).exists() {
        return id;
      }
      warn!("标识符 {} 冲突，重新生成", id);
    }
    naming::new_identifier()
  }

  pub fn file_name(identifier: &str) -> String {
    ArtifactRole::Result.file_name(identifier)
  }

  /// 以 JPEG 保存标注图像，返回写入路径
  pub fn save(&self, identifier: &str, image: &RgbImage) -> Result<PathBuf, StoreError> {
    naming::validate_file_name(identifier)?;
    let path = naming::output_path(&self.root, identifier, ArtifactRole::Result);
    image
      .save_with_format(&path, ImageFormat::Jpeg)
      .map_err(|source| StoreError::Write {
        path: path.clone(),
        source,
      })?;
    info!("保存结果图像: {}", path.display());
    Ok(path)
  }

  fn resolve(&self, filename: &str) -> Result<PathBuf, StoreError> {
    naming::validate_file_name(filename)?;
    Ok(self.root.join(filename))
  }

  pub fn contains(&self, filename: &str) -> bool {
    self
      .resolve(filename)
      .map(|path| path.is_file())
      .unwrap_or(false)
  }

  pub fn fetch(&self, filename: &str) -> Result<Vec<u8>, StoreError> {
    let path = self.resolve(filename)?;
    match std::fs::read(&path) {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(StoreError::NotFound(filename.to_string()))
      }
      Err(source) => Err(StoreError::Io { path, source }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn save_then_fetch_returns_written_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::open(tmp.path().join("results")).unwrap();
    let id = store.allocate_identifier();
    let image = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));

    let path = store.save(&id, &image).unwrap();
    let name = ResultStore::file_name(&id);
    assert_eq!(path, store.root().join(&name));
    assert!(store.contains(&name));
    assert_eq!(store.fetch(&name).unwrap(), std::fs::read(&path).unwrap());
  }

  #[test]
  fn save_overwrites_existing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::open(tmp.path()).unwrap();
    store.save("abc", &RgbImage::new(4, 4)).unwrap();
    let second = store.save("abc", &RgbImage::new(16, 16)).unwrap();
    let reread = image::open(second).unwrap();
    assert_eq!(reread.width(), 16);
  }

  #[test]
  fn fetch_missing_and_invalid() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultStore::open(tmp.path().join("results")).unwrap();
    std::fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();

    assert!(matches!(
      store.fetch("nope_result.jpg"),
      Err(StoreError::NotFound(_))
    ));
    for name in ["../secret.txt", "..", "sub/secret.txt", "..\\secret.txt"] {
      assert!(matches!(store.fetch(name), Err(StoreError::InvalidName(_))));
      assert!(!store.contains(name));
    }
  }
}
