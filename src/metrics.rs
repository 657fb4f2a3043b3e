// 该文件是 Toukui （头盔）项目的一部分。
// src/metrics.rs - 训练指标表与曲线
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

use ab_glyph::FontArc;
use image::ImageFormat;
use thiserror::Error;
use tracing::{info, warn};

use crate::naming::{self, ArtifactRole};

pub mod chart;
use self::chart::LineChart;

#[derive(Error, Debug)]
pub enum PlotError {
  #[error("指标表读取错误 {path}: {source}")]
  Csv {
    path: PathBuf,
    #[source]
    source: csv::Error,
  },
  #[error("无法创建输出目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("曲线图写入失败 {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 一条曲线：显示名称与可接受的列名
struct SeriesSpec {
  label: &'static str,
  columns: &'static [&'static str],
}

const LOSS_SERIES: [SeriesSpec; 3] = [
  SeriesSpec {
    label: "Train Box Loss",
    columns: &["train/box_loss", "train_box_loss"],
  },
  SeriesSpec {
    label: "Train Cls Loss",
    columns: &["train/cls_loss", "train_cls_loss"],
  },
  SeriesSpec {
    label: "Train DFL Loss",
    columns: &["train/dfl_loss", "train_dfl_loss"],
  },
];

const VAL_SERIES: [SeriesSpec; 4] = [
  SeriesSpec {
    label: "Precision",
    columns: &["metrics/precision(B)", "precision"],
  },
  SeriesSpec {
    label: "Recall",
    columns: &["metrics/recall(B)", "recall"],
  },
  SeriesSpec {
    label: "mAP@50",
    columns: &["metrics/mAP50(B)", "mAP50"],
  },
  SeriesSpec {
    label: "mAP@50-95",
    columns: &["metrics/mAP50-95(B)", "mAP50_95"],
  },
];

/// 按 epoch 排列的训练指标，列均为可选
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsTable {
  rows: BTreeMap<i64, BTreeMap<String, f64>>,
}

fn parse_epoch(cell: &str) -> Option<i64> {
  cell.parse::<i64>().ok().or_else(|| {
    parse_value(cell)
      .filter(|v| v.abs() < i64::MAX as f64)
      .map(|v| v.round() as i64)
  })
}

/// 单元格数值；`nan`、`inf` 视同无法解析
fn parse_value(cell: &str) -> Option<f64> {
  cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl MetricsTable {
  pub fn from_path(path: &Path) -> Result<Self, PlotError> {
    let reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(true)
      .from_path(path)
      .map_err(|source| PlotError::Csv {
        path: path.to_path_buf(),
        source,
      })?;
    Self::from_reader(reader).map_err(|source| PlotError::Csv {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, csv::Error> {
    let headers = reader.headers()?.clone();
    let epoch_idx = headers.iter().position(|h| h == "epoch");
    if epoch_idx.is_none() {
      warn!("指标表缺少 epoch 列，按行号排列");
    }

    let mut rows = BTreeMap::new();
    for (no, record) in reader.records().enumerate() {
      let record = record?;
      let epoch = match epoch_idx {
        Some(idx) => match record.get(idx).and_then(parse_epoch) {
          Some(epoch) => epoch,
          None => {
            warn!("第 {} 行 epoch 无效，跳过", no + 2);
            continue;
          }
        },
        None => no as i64,
      };

      let values: BTreeMap<String, f64> = headers
        .iter()
        .zip(record.iter())
        .filter(|(h, _)| *h != "epoch")
        .filter_map(|(h, v)| parse_value(v).map(|v| (h.to_string(), v)))
        .collect();
      if rows.insert(epoch, values).is_some() {
        warn!("epoch {} 重复，保留最后一行", epoch);
      }
    }

    Ok(Self { rows })
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn has_column(&self, column: &str) -> bool {
    self.rows.values().any(|row| row.contains_key(column))
  }

  /// 某列对 epoch 的序列，缺失值跳过
  pub fn series(&self, column: &str) -> Vec<(f64, f64)> {
    self
      .rows
      .iter()
      .filter_map(|(epoch, row)| row.get(column).map(|v| (*epoch as f64, *v)))
      .collect()
  }

  fn chart(&self, title: &str, y_label: &str, specs: &[SeriesSpec]) -> LineChart {
    let mut chart = LineChart::new(title, "Epoch", y_label);
    for spec in specs {
      if let Some(column) = spec.columns.iter().find(|c| self.has_column(c)) {
        chart.push_series(spec.label, self.series(column));
      }
    }
    chart
  }

  pub fn loss_chart(&self) -> LineChart {
    self.chart("Training Loss Metrics", "Loss", &LOSS_SERIES)
  }

  pub fn val_chart(&self) -> LineChart {
    self.chart("Validation Metrics", "Metric", &VAL_SERIES)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotOutcome {
  Rendered {
    loss_chart: PathBuf,
    val_chart: PathBuf,
  },
  /// 指标表不存在
  Skipped,
}

/// 根据 results.csv 绘制损失曲线与验证曲线
#[derive(Clone, Default)]
pub struct MetricsPlotter {
  font: Option<FontArc>,
}

impl MetricsPlotter {
  pub fn new(font: Option<FontArc>) -> Self {
    Self { font }
  }

  pub fn plot(&self, csv_path: &Path, output_dir: &Path) -> Result<PlotOutcome, PlotError> {
    if !csv_path.is_file() {
      warn!("{} 不存在，跳过绘图", csv_path.display());
      return Ok(PlotOutcome::Skipped);
    }

    let table = MetricsTable::from_path(csv_path)?;
    std::fs::create_dir_all(output_dir).map_err(|source| PlotError::CreateDir {
      path: output_dir.to_path_buf(),
      source,
    })?;

    let loss_chart = naming::output_path(output_dir, "", ArtifactRole::LossChart);
    let val_chart = naming::output_path(output_dir, "", ArtifactRole::ValChart);
    self.write(&table.loss_chart(), &loss_chart)?;
    self.write(&table.val_chart(), &val_chart)?;

    info!("训练曲线已保存到 {}", output_dir.display());
    Ok(PlotOutcome::Rendered {
      loss_chart,
      val_chart,
    })
  }

  fn write(&self, chart: &LineChart, path: &Path) -> Result<(), PlotError> {
    chart
      .render(self.font.as_ref())
      .save_with_format(path, ImageFormat::Png)
      .map_err(|source| PlotError::Write {
        path: path.to_path_buf(),
        source,
      })
  }
}
