// 该文件是 Toukui （头盔）项目的一部分。
// src/bundle.rs - 轻量打包
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::metrics::{MetricsPlotter, PlotOutcome};
use crate::naming::{self, ArtifactRole};

/// 打包时收集的权重文件
pub const WEIGHT_FILES: [&str; 2] = ["best.pt", "last.pt"];
/// 叠加图在打包目录中的位置
pub const OVERLAY_DIR: &str = "pred_overlays";

#[derive(Error, Debug)]
pub enum BundleError {
  #[error("无法创建目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法写入说明文件 {path}: {source}")]
  Manifest {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法遍历打包目录 {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("归档写入失败 {path}: {source}")]
  Archive {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },
}

/// 一次打包的输入
#[derive(Debug, Clone)]
pub struct BundleRequest {
  pub weights_dir: PathBuf,
  pub overlays_dir: PathBuf,
  pub training_results_dir: PathBuf,
  pub name: String,
  pub output_root: PathBuf,
}

/// 打包结果
#[derive(Debug, Clone)]
pub struct Bundle {
  pub bundle_directory: PathBuf,
  pub manifest: String,
  pub archive_path: PathBuf,
  pub weights: Vec<String>,
  pub overlays_included: bool,
  pub metrics_included: bool,
  /// 归档中的文件数
  pub entries: usize,
}

/// 收集权重、叠加图、训练指标与曲线，写说明文件并压缩为 zip
///
/// 打包目录重复使用时不会先清空，文件逐个覆盖。
/// 同一 `name` 的并发打包需由调用方串行化。
#[derive(Clone, Default)]
pub struct BundleAssembler {
  plotter: MetricsPlotter,
}

impl BundleAssembler {
  pub fn new(plotter: MetricsPlotter) -> Self {
    Self { plotter }
  }

  pub fn assemble(&self, request: &BundleRequest) -> Result<Bundle, BundleError> {
    let bundle_dir = naming::bundle_directory(&request.output_root, &request.name);
    std::fs::create_dir_all(&bundle_dir).map_err(|source| BundleError::CreateDir {
      path: bundle_dir.clone(),
      source,
    })?;

    let weights = copy_weights(&request.weights_dir, &bundle_dir);

    let overlays_included = if request.overlays_dir.is_dir() {
      let copied = copy_tree(&request.overlays_dir, &bundle_dir.join(OVERLAY_DIR));
      info!("复制 {} 张叠加图", copied);
      true
    } else {
      warn!("叠加图目录 {} 不存在，跳过", request.overlays_dir.display());
      false
    };

    let metrics_included = self.copy_metrics(&request.training_results_dir, &bundle_dir);

    let manifest = render_manifest(request, &weights, overlays_included, metrics_included);
    let manifest_path = naming::output_path(&bundle_dir, &request.name, ArtifactRole::Manifest);
    std::fs::write(&manifest_path, &manifest).map_err(|source| BundleError::Manifest {
      path: manifest_path.clone(),
      source,
    })?;

    let archive_path = naming::output_path(&request.output_root, &request.name, ArtifactRole::Bundle);
    let entries = archive_directory(&bundle_dir, &archive_path)?;
    info!("打包完成: {}（{} 个文件）", archive_path.display(), entries);

    Ok(Bundle {
      bundle_directory: bundle_dir,
      manifest,
      archive_path,
      weights,
      overlays_included,
      metrics_included,
      entries,
    })
  }

  fn copy_metrics(&self, results_dir: &Path, bundle_dir: &Path) -> bool {
    let file_name = ArtifactRole::MetricsTable.file_name("");
    let source = results_dir.join(&file_name);
    if !source.is_file() {
      warn!("{} 不存在，跳过训练指标", source.display());
      return false;
    }

    let target = bundle_dir.join(&file_name);
    if let Err(e) = std::fs::copy(&source, &target) {
      warn!("复制 {} 失败: {}", source.display(), e);
      return false;
    }

    match self.plotter.plot(&target, bundle_dir) {
      Ok(PlotOutcome::Rendered { .. }) => {}
      Ok(PlotOutcome::Skipped) => warn!("未生成训练曲线"),
      Err(e) => warn!("绘制训练曲线失败: {}", e),
    }
    true
  }
}

fn copy_weights(weights_dir: &Path, bundle_dir: &Path) -> Vec<String> {
  let mut copied = Vec::new();
  for name in WEIGHT_FILES {
    let source = weights_dir.join(name);
    if !source.is_file() {
      warn!("权重文件 {} 不存在，跳过", source.display());
      continue;
    }
    match std::fs::copy(&source, bundle_dir.join(name)) {
      Ok(_) => copied.push(name.to_string()),
      Err(e) => warn!("复制权重 {} 失败: {}", source.display(), e),
    }
  }
  copied
}

/// 递归复制目录，逐个覆盖目标文件；返回成功复制的文件数
fn copy_tree(source: &Path, target: &Path) -> usize {
  if let Err(e) = std::fs::create_dir_all(target) {
    warn!("无法创建目录 {}: {}", target.display(), e);
    return 0;
  }
  let entries = match sorted_entries(source) {
    Ok(entries) => entries,
    Err(e) => {
      warn!("无法读取目录 {}: {}", source.display(), e);
      return 0;
    }
  };

  let mut copied = 0;
  for path in entries {
    let Some(name) = path.file_name() else {
      continue;
    };
    let dest = target.join(name);
    if path.is_dir() {
      copied += copy_tree(&path, &dest);
    } else {
      match std::fs::copy(&path, &dest) {
        Ok(_) => copied += 1,
        Err(e) => warn!("复制 {} 失败: {}", path.display(), e),
      }
    }
  }
  copied
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
  let mut entries = std::fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<Result<Vec<_>, _>>()?;
  entries.sort();
  Ok(entries)
}

/// 打包目录下全部文件的相对路径，按字典序
pub fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
  fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for path in sorted_entries(dir)? {
      if path.is_dir() {
        walk(root, &path, out)?;
      } else if let Ok(relative) = path.strip_prefix(root) {
        out.push(relative.to_path_buf());
      }
    }
    Ok(())
  }

  let mut files = Vec::new();
  walk(root, root, &mut files)?;
  Ok(files)
}

fn entry_name(relative: &Path) -> String {
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn render_manifest(
  request: &BundleRequest,
  weights: &[String],
  overlays_included: bool,
  metrics_included: bool,
) -> String {
  let weights = if weights.is_empty() {
    "(none)".to_string()
  } else {
    weights.join(", ")
  };
  let mark = |included: bool| if included { "" } else { " (not found)" };

  format!(
    "Bundle: {}\nCreated: {}\nWeights: {}\nPredictions from: {}{}\nTraining results from: {}{}\n",
    request.name,
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    weights,
    request.overlays_dir.display(),
    mark(overlays_included),
    request.training_results_dir.display(),
    mark(metrics_included),
  )
}

/// 将目录压缩为 zip，条目路径相对于目录本身；返回写入的文件数
fn archive_directory(dir: &Path, archive: &Path) -> Result<usize, BundleError> {
  let files = collect_files(dir).map_err(|source| BundleError::Walk {
    path: dir.to_path_buf(),
    source,
  })?;
  let archive_err = |source: zip::result::ZipError| BundleError::Archive {
    path: archive.to_path_buf(),
    source,
  };

  let file = File::create(archive).map_err(|e| archive_err(e.into()))?;
  let mut zip = ZipWriter::new(BufWriter::new(file));
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

  for relative in &files {
    let data = std::fs::read(dir.join(relative)).map_err(|e| archive_err(e.into()))?;
    zip
      .start_file(entry_name(relative), options)
      .map_err(archive_err)?;
    zip.write_all(&data).map_err(|e| archive_err(e.into()))?;
  }

  let mut writer = zip.finish().map_err(archive_err)?;
  writer.flush().map_err(|e| archive_err(e.into()))?;
  Ok(files.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entry_names_use_forward_slashes() {
    let relative = Path::new(OVERLAY_DIR).join("a_overlay.jpg");
    assert_eq!(entry_name(&relative), "pred_overlays/a_overlay.jpg");
  }

  #[test]
  fn manifest_lists_included_weights() {
    let request = BundleRequest {
      weights_dir: PathBuf::from("w"),
      overlays_dir: PathBuf::from("runs/detect/exp/pred_overlays"),
      training_results_dir: PathBuf::from("runs/train/exp"),
      name: "exp".to_string(),
      output_root: PathBuf::from("Light_Bundles"),
    };
    let text = render_manifest(&request, &["best.pt".to_string()], true, false);
    assert!(text.contains("Weights: best.pt\n"));
    assert!(text.contains("Predictions from: runs/detect/exp/pred_overlays\n"));
    assert!(text.contains("Training results from: runs/train/exp (not found)\n"));

    let empty = render_manifest(&request, &[], false, false);
    assert!(empty.contains("Weights: (none)\n"));
  }

  #[test]
  fn empty_inputs_still_produce_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let request = BundleRequest {
      weights_dir: tmp.path().join("missing_weights"),
      overlays_dir: tmp.path().join("missing_overlays"),
      training_results_dir: tmp.path().join("missing_results"),
      name: "exp".to_string(),
      output_root: tmp.path().join("Light_Bundles"),
    };
    let bundle = BundleAssembler::default().assemble(&request).unwrap();
    assert_eq!(bundle.entries, 1);
    assert!(bundle.bundle_directory.join("readme.txt").is_file());
    assert_eq!(
      bundle.archive_path,
      tmp.path().join("Light_Bundles").join("exp_bundle.zip")
    );
  }
}
