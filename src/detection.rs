// 该文件是 Toukui （头盔）项目的一部分。
// src/detection.rs - 检测结果与推理适配
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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::draw::Draw;

#[cfg(feature = "model_onnx")]
mod onnx;
pub mod yolo;

#[cfg(feature = "model_onnx")]
pub use self::onnx::OnnxDetector;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("图像读取错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("图像解码错误 {path}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("检测框无效: {0}")]
  InvalidDetection(String),
}

/// 单个检测目标，`bbox` 为像素坐标 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub class_id: u32,
  pub label: String,
  pub confidence: f32,
  #[serde(rename = "box")]
  pub bbox: [f32; 4],
}

impl Detection {
  pub fn new(
    class_id: u32,
    label: impl Into<String>,
    confidence: f32,
    bbox: [f32; 4],
  ) -> Result<Self, DetectError> {
    if !(0.0..=1.0).contains(&confidence) {
      return Err(DetectError::InvalidDetection(format!(
        "置信度 {} 超出 [0, 1]",
        confidence
      )));
    }
    let [x1, y1, x2, y2] = bbox;
    if !(x1 < x2 && y1 < y2) {
      return Err(DetectError::InvalidDetection(format!(
        "坐标 {:?} 不满足 x1<x2, y1<y2",
        bbox
      )));
    }
    Ok(Self {
      class_id,
      label: label.into(),
      confidence,
      bbox,
    })
  }
}

/// 类别编号到名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: BTreeMap<u32, String>,
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::helmet()
  }
}

impl LabelTable {
  pub fn new(names: impl IntoIterator<Item = (u32, String)>) -> Self {
    Self {
      names: names.into_iter().collect(),
    }
  }

  /// 头盔数据集的两类标签
  pub fn helmet() -> Self {
    Self::new([(0, "helmet".to_string()), (1, "no_helmet".to_string())])
  }

  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(&class_id)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }

  pub fn id_of(&self, name: &str) -> Option<u32> {
    self
      .names
      .iter()
      .find(|(_, n)| n.as_str() == name)
      .map(|(id, _)| *id)
  }
}

/// 检测模型
///
/// 模型在进程启动时加载一次，之后只读共享；每次调用处理一张图像。
pub trait Detector: Send + Sync {
  fn labels(&self) -> &LabelTable;

  /// 返回按模型输出顺序排列、置信度不低于 `confidence` 的检测结果
  fn detect(
    &self,
    source: &Path,
    image: &RgbImage,
    confidence: f32,
  ) -> Result<Vec<Detection>, DetectError>;
}

/// 单张图像的推理结果
#[derive(Debug, Clone)]
pub struct PredictionResult {
  pub source: PathBuf,
  pub detections: Vec<Detection>,
  pub annotated: RgbImage,
}

impl PredictionResult {
  /// 源文件名去掉扩展名
  pub fn source_stem(&self) -> String {
    self
      .source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string())
  }
}

/// 读取图像文件，根据内容判断格式
pub fn read_image(path: &Path) -> Result<RgbImage, DetectError> {
  let reader = ImageReader::open(path)
    .and_then(|r| r.with_guessed_format())
    .map_err(|source| DetectError::Io {
      path: path.to_path_buf(),
      source,
    })?;
  let image = reader.decode().map_err(|source| DetectError::Decode {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(image.into())
}

/// 定位可加载的 ONNX 模型
///
/// 接受 `.onnx` 文件；给出 `.pt` 权重时使用同目录下 `yolo export` 导出的同名 `.onnx`。
pub fn onnx_weights(weights: &Path) -> Result<PathBuf, DetectError> {
  let is_onnx = weights
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
  let model = if is_onnx {
    weights.to_path_buf()
  } else {
    weights.with_extension("onnx")
  };

  if model.is_file() {
    Ok(model)
  } else {
    Err(DetectError::ModelLoad(format!(
      "找不到 ONNX 模型 {}，请先执行 `yolo export model={} format=onnx`",
      model.display(),
      weights.display()
    )))
  }
}

/// 启动时加载检测模型，模型不可用时直接失败
pub fn load_detector(
  weights: &Path,
  labels: LabelTable,
) -> Result<Box<dyn Detector>, DetectError> {
  let model = onnx_weights(weights)?;

  #[cfg(feature = "model_onnx")]
  let detector = OnnxDetector::load(&model, labels).map(|d| Box::new(d) as Box<dyn Detector>);

  #[cfg(not(feature = "model_onnx"))]
  let detector = {
    drop(labels);
    Err(DetectError::ModelLoad(format!(
      "{}: 未启用 model_onnx 特性，没有可用的推理后端",
      model.display()
    )))
  };

  detector
}

/// 推理适配器：读取图像、调用模型、绘制标注
pub struct InferenceAdapter {
  detector: Box<dyn Detector>,
  draw: Draw,
  confidence: f32,
}

impl InferenceAdapter {
  pub fn new(detector: Box<dyn Detector>, draw: Draw) -> Self {
    Self {
      detector,
      draw,
      confidence: DEFAULT_CONFIDENCE,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn predict_path(&self, source: &Path) -> Result<PredictionResult, DetectError> {
    let image = read_image(source)?;
    self.predict_image(source, image)
  }

  pub fn predict_image(
    &self,
    source: &Path,
    image: RgbImage,
  ) -> Result<PredictionResult, DetectError> {
    let now = std::time::Instant::now();
    let mut detections = self.detector.detect(source, &image, self.confidence)?;
    detections.retain(|d| d.confidence >= self.confidence);
    debug!(
      "{} 推理完成，检测到 {} 个目标，耗时: {:.2?}",
      source.display(),
      detections.len(),
      now.elapsed()
    );

    let annotated = self.draw.annotate(&image, &detections);
    Ok(PredictionResult {
      source: source.to_path_buf(),
      detections,
      annotated,
    })
  }
}
