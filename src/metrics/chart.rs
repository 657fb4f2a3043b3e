// 该文件是 Toukui （头盔）项目的一部分。
// src/metrics/chart.rs - 折线图绘制
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
  draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: f32 = 70.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 40.0;
const MARGIN_BOTTOM: f32 = 50.0;
const TICKS: usize = 5;
const TITLE_SIZE: f32 = 18.0;
const TEXT_SIZE: f32 = 13.0;
const SWATCH: u32 = 12;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FOREGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

// matplotlib 默认色环
pub const SERIES_COLORS: [Rgb<u8>; 4] = [
  Rgb([31, 119, 180]),
  Rgb([255, 127, 14]),
  Rgb([44, 160, 44]),
  Rgb([214, 39, 40]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
  pub label: String,
  pub color: Rgb<u8>,
  pub points: Vec<(f64, f64)>,
}

impl Series {
  /// 跳过 `nan` 与无穷值
  fn finite_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
    self
      .points
      .iter()
      .copied()
      .filter(|(x, y)| x.is_finite() && y.is_finite())
  }
}

/// 以 epoch 为横轴的折线图
#[derive(Debug, Clone, PartialEq)]
pub struct LineChart {
  pub title: String,
  pub x_label: String,
  pub y_label: String,
  pub series: Vec<Series>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
  min: f64,
  max: f64,
}

impl Range {
  fn of(values: impl Iterator<Item = f64>) -> Self {
    let (min, max) = values
      .filter(|v| v.is_finite())
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
      });
    if !min.is_finite() || !max.is_finite() {
      Range { min: 0.0, max: 1.0 }
    } else if (max - min).abs() < f64::EPSILON {
      Range {
        min: min - 0.5,
        max: max + 0.5,
      }
    } else {
      Range { min, max }
    }
  }

  fn fraction(&self, v: f64) -> f64 {
    (v - self.min) / (self.max - self.min)
  }

  fn tick(&self, i: usize) -> f64 {
    self.min + (self.max - self.min) * i as f64 / TICKS as f64
  }
}

struct Frame {
  x: Range,
  y: Range,
  left: f32,
  right: f32,
  top: f32,
  bottom: f32,
}

impl Frame {
  fn to_pixel(&self, (x, y): (f64, f64)) -> (f32, f32) {
    let px = self.left + (self.right - self.left) * self.x.fraction(x) as f32;
    let py = self.bottom - (self.bottom - self.top) * self.y.fraction(y) as f32;
    (px, py)
  }
}

fn format_tick(v: f64) -> String {
  if v.abs() >= 100.0 || (v.fract().abs() < 1e-9 && v.abs() >= 1.0) {
    format!("{:.0}", v)
  } else {
    format!("{:.3}", v)
  }
}

impl LineChart {
  pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
    Self {
      title: title.to_string(),
      x_label: x_label.to_string(),
      y_label: y_label.to_string(),
      series: Vec::new(),
    }
  }

  pub fn push_series(&mut self, label: &str, points: Vec<(f64, f64)>) {
    let color = SERIES_COLORS[self.series.len() % SERIES_COLORS.len()];
    self.series.push(Series {
      label: label.to_string(),
      color,
      points,
    });
  }

  fn frame(&self) -> Frame {
    let points = || self.series.iter().flat_map(Series::finite_points);
    Frame {
      x: Range::of(points().map(|(x, _)| x)),
      y: Range::of(points().map(|(_, y)| y)),
      left: MARGIN_LEFT,
      right: WIDTH as f32 - MARGIN_RIGHT,
      top: MARGIN_TOP,
      bottom: HEIGHT as f32 - MARGIN_BOTTOM,
    }
  }

  /// 渲染为图像；相同输入总是得到相同像素
  pub fn render(&self, font: Option<&FontArc>) -> RgbImage {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    let frame = self.frame();

    // 网格与刻度
    for i in 0..=TICKS {
      let (gx, _) = frame.to_pixel((frame.x.tick(i), frame.y.min));
      let (_, gy) = frame.to_pixel((frame.x.min, frame.y.tick(i)));
      draw_line_segment_mut(&mut image, (gx, frame.top), (gx, frame.bottom), GRID);
      draw_line_segment_mut(&mut image, (frame.left, gy), (frame.right, gy), GRID);
      draw_line_segment_mut(&mut image, (gx, frame.bottom), (gx, frame.bottom + 4.0), FOREGROUND);
      draw_line_segment_mut(&mut image, (frame.left - 4.0, gy), (frame.left, gy), FOREGROUND);

      if let Some(font) = font {
        let scale = PxScale::from(TEXT_SIZE);
        let x_text = format_tick(frame.x.tick(i));
        let (w, _) = text_size(scale, font, &x_text);
        let x = gx as i32 - w as i32 / 2;
        draw_text_mut(&mut image, FOREGROUND, x, frame.bottom as i32 + 6, scale, font, &x_text);

        let y_text = format_tick(frame.y.tick(i));
        let (w, h) = text_size(scale, font, &y_text);
        let x = frame.left as i32 - 8 - w as i32;
        let y = gy as i32 - h as i32 / 2;
        draw_text_mut(&mut image, FOREGROUND, x, y, scale, font, &y_text);
      }
    }

    // 坐标框
    let plot = Rect::at(frame.left as i32, frame.top as i32).of_size(
      (frame.right - frame.left) as u32 + 1,
      (frame.bottom - frame.top) as u32 + 1,
    );
    draw_hollow_rect_mut(&mut image, plot, FOREGROUND);

    // 折线
    for series in &self.series {
      let pixels: Vec<(f32, f32)> = series.finite_points().map(|p| frame.to_pixel(p)).collect();
      for pair in pixels.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        draw_line_segment_mut(&mut image, a, b, series.color);
        draw_line_segment_mut(&mut image, (a.0, a.1 + 1.0), (b.0, b.1 + 1.0), series.color);
      }
      if let [only] = pixels.as_slice() {
        let dot = Rect::at(only.0 as i32 - 2, only.1 as i32 - 2).of_size(5, 5);
        draw_filled_rect_mut(&mut image, dot, series.color);
      }
    }

    self.draw_legend(&mut image, &frame, font);

    if let Some(font) = font {
      let scale = PxScale::from(TITLE_SIZE);
      let (w, _) = text_size(scale, font, &self.title);
      let x = (WIDTH as i32 - w as i32) / 2;
      draw_text_mut(&mut image, FOREGROUND, x, 10, scale, font, &self.title);

      let scale = PxScale::from(TEXT_SIZE);
      let (w, _) = text_size(scale, font, &self.x_label);
      let x = (frame.left + frame.right) as i32 / 2 - w as i32 / 2;
      draw_text_mut(&mut image, FOREGROUND, x, HEIGHT as i32 - 22, scale, font, &self.x_label);
      draw_text_mut(&mut image, FOREGROUND, 6, frame.top as i32 - 18, scale, font, &self.y_label);
    }

    image
  }

  fn draw_legend(&self, image: &mut RgbImage, frame: &Frame, font: Option<&FontArc>) {
    let scale = PxScale::from(TEXT_SIZE);
    let x = frame.right as i32 - 150;
    let mut y = frame.top as i32 + 8;
    for series in &self.series {
      let swatch = Rect::at(x, y).of_size(SWATCH, SWATCH);
      draw_filled_rect_mut(image, swatch, series.color);
      if let Some(font) = font {
        draw_text_mut(image, FOREGROUND, x + SWATCH as i32 + 6, y - 1, scale, font, &series.label);
      }
      y += SWATCH as i32 + 6;
    }
  }
}
