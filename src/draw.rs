// 该文件是 Toukui （头盔）项目的一部分。
// src/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::detection::Detection;

/// 字体路径环境变量
pub const FONT_ENV: &str = "TOUKUI_FONT";

// 常见系统字体位置
const SYSTEM_FONTS: [&str; 5] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_HORIZONTAL_PADDING: u32 = 4;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 20;

/// 加载 TrueType 字体
///
/// 依次尝试显式路径、`TOUKUI_FONT` 环境变量和常见系统字体，都不可用时返回 `None`，
/// 此时只绘制图形不绘制文字。
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
  let mut candidates: Vec<PathBuf> = Vec::new();
  if let Some(path) = explicit {
    candidates.push(path.to_path_buf());
  }
  if let Ok(path) = std::env::var(FONT_ENV) {
    candidates.push(PathBuf::from(path));
  }
  candidates.extend(SYSTEM_FONTS.iter().map(PathBuf::from));

  for path in candidates {
    let Ok(data) = std::fs::read(&path) else {
      continue;
    };
    match FontArc::try_from_vec(data) {
      Ok(font) => {
        debug!("使用字体: {}", path.display());
        return Some(font);
      }
      Err(e) => warn!("字体文件无效 {}: {}", path.display(), e),
    }
  }

  debug!("未找到可用字体，标注将不包含文字");
  None
}

/// HSV 转 RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 在图像上绘制检测框与标签
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(load_font(None))
  }
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        // 交错取色，使相邻类别颜色差异更大
        let hue = ((i * 7) % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  pub fn font(&self) -> Option<&FontArc> {
    self.font.as_ref()
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 返回绘制了全部检测结果的新图像，无检测时与原图相同
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
      self.draw_detection(&mut canvas, detection);
    }
    canvas
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let color = self.color_of(detection.class_id);

    let [x1, y1, x2, y2] = detection.bbox;
    let x_min = (x1.floor() as i32).clamp(0, w - 1);
    let y_min = (y1.floor() as i32).clamp(0, h - 1);
    let x_max = (x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (y2.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let (text_w, text_h) = text_size(self.font_scale, font, &label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签优先放在边框上方，空间不足时放在框内
    let label_x = x_min;
    let label_y = if y_min - label_h >= 0 {
      y_min - label_h
    } else {
      y_min
    };
    let label_w = (text_w + 2 * LABEL_HORIZONTAL_PADDING).min((w - label_x) as u32);

    if label_w > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x + LABEL_HORIZONTAL_PADDING as i32,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        font,
        &label,
      );
    }
  }
}
