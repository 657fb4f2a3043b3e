// 该文件是 Toukui （头盔）项目的一部分。
// src/task.rs - 批量推理与训练任务
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

mod batch;
mod train;

pub use self::batch::{BatchReport, BatchRunner};
pub use self::train::{TrainError, TrainReport, TrainRequest, Trainer, TrainingDriver, UltralyticsCli};

/// 支持的输入图像扩展名
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 列出目录下的图像文件（不递归），按文件名排序
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
  let mut images = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let is_image = path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
    if is_image && path.is_file() {
      images.push(path);
    }
  }
  images.sort();
  Ok(images)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lists_only_images_sorted() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["b.JPG", "a.png", "notes.txt", "c.jpeg"] {
      std::fs::write(tmp.path().join(name), b"x").unwrap();
    }
    std::fs::create_dir(tmp.path().join("d.jpg")).unwrap();
    let names: Vec<_> = list_images(tmp.path())
      .unwrap()
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);
  }
}
