// 该文件是 Toukui （头盔）项目的一部分。
// src/detection/yolo.rs - YOLO 预处理与后处理
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};

use super::{DetectError, Detection, LabelTable};

/// 模型输入边长
pub const INPUT_SIZE: u32 = 640;
/// NMS IoU 阈值
pub const IOU_THRESHOLD: f32 = 0.7;
/// 单张图像最多保留的检测数
pub const MAX_DETECTIONS: usize = 300;

const PAD_VALUE: u8 = 114;

/// 等比缩放后居中填充为正方形输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  /// 缩放后的宽高
  pub resized: (u32, u32),
  /// 左上角填充偏移
  pub offset: (u32, u32),
  pub size: u32,
}

impl Letterbox {
  pub fn fit(width: u32, height: u32, size: u32) -> Self {
    let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
    let resized = (
      ((width as f32 * scale).round() as u32).clamp(1, size),
      ((height as f32 * scale).round() as u32).clamp(1, size),
    );
    let offset = ((size - resized.0) / 2, (size - resized.1) / 2);
    Self {
      scale,
      resized,
      offset,
      size,
    }
  }

  pub fn apply(&self, image: &RgbImage) -> RgbImage {
    let resized = imageops::resize(image, self.resized.0, self.resized.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(
      &mut canvas,
      &resized,
      i64::from(self.offset.0),
      i64::from(self.offset.1),
    );
    canvas
  }

  /// 输入坐标映射回原图坐标
  pub fn restore(&self, x: f32, y: f32) -> (f32, f32) {
    (
      (x - self.offset.0 as f32) / self.scale,
      (y - self.offset.1 as f32) / self.scale,
    )
  }
}

/// NCHW 排列、归一化到 [0, 1] 的输入张量
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
  let plane = (image.width() * image.height()) as usize;
  let mut data = vec![0f32; plane * 3];
  for (i, pixel) in image.pixels().enumerate() {
    for c in 0..3 {
      data[c * plane + i] = pixel[c] as f32 / 255.0;
    }
  }
  data
}

/// 解码 `[1, 4 + 类别数, 候选数]` 输出
///
/// 每个候选为 `cx, cy, w, h` 与各类别分数（ultralytics 导出格式），坐标位于输入空间。
pub fn decode(
  shape: &[usize],
  data: &[f32],
  labels: &LabelTable,
  confidence: f32,
  letterbox: &Letterbox,
  original: (u32, u32),
) -> Result<Vec<Detection>, DetectError> {
  let &[1, channels, anchors] = shape else {
    return Err(DetectError::Inference(format!("输出形状不支持: {:?}", shape)));
  };
  if channels <= 4 || data.len() != channels * anchors {
    return Err(DetectError::Inference(format!(
      "输出形状 {:?} 与数据长度 {} 不匹配",
      shape,
      data.len()
    )));
  }

  let at = |row: usize, anchor: usize| data[row * anchors + anchor];
  let (width, height) = (original.0 as f32, original.1 as f32);
  let mut detections = Vec::new();

  for anchor in 0..anchors {
    // 找到最高类别分数
    let (class_id, score) = (0..channels - 4)
      .map(|k| (k, at(4 + k, anchor)))
      .fold((0, f32::NEG_INFINITY), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });
    if !score.is_finite() || score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
    let (x1, y1) = letterbox.restore(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.restore(cx + w / 2.0, cy + h / 2.0);
    let bbox = [
      x1.clamp(0.0, width),
      y1.clamp(0.0, height),
      x2.clamp(0.0, width),
      y2.clamp(0.0, height),
    ];

    let class_id = class_id as u32;
    if let Ok(d) = Detection::new(class_id, labels.name(class_id), score.min(1.0), bbox) {
      detections.push(d);
    }
  }

  Ok(nms(detections, IOU_THRESHOLD))
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<Detection> = Vec::new();
  for det in detections {
    if kept.len() >= MAX_DETECTIONS {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == det.class_id && iou(&k.bbox, &det.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(det);
    }
  }
  kept
}

/// 两个 `[x1, y1, x2, y2]` 框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let intersection = w * h;
  let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
