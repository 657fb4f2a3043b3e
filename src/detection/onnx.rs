// 该文件是 Toukui （头盔）项目的一部分。
// src/detection/onnx.rs - ONNX Runtime 检测后端
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

use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::RgbImage;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;
use tracing::{debug, info};

use super::yolo::{self, Letterbox};
use super::{DetectError, Detection, Detector, LabelTable};

/// ultralytics 导出模型的输入输出名
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// 加载 `yolo export format=onnx` 导出的模型
pub struct OnnxDetector {
  // 推理需要可变借用
  session: Mutex<Session>,
  input_size: u32,
  labels: LabelTable,
}

impl OnnxDetector {
  pub fn load(model: &Path, labels: LabelTable) -> Result<Self, DetectError> {
    info!("加载 ONNX 模型: {}", model.display());
    let start = Instant::now();
    let session = Session::builder()
      .and_then(|builder| builder.commit_from_file(model))
      .map_err(|e| DetectError::ModelLoad(format!("{}: {}", model.display(), e)))?;
    info!("模型加载完成，耗时 {:?}", start.elapsed());

    Ok(Self {
      session: Mutex::new(session),
      input_size: yolo::INPUT_SIZE,
      labels,
    })
  }

  fn infer(&self, input: &[f32]) -> Result<(Vec<usize>, Vec<f32>), DetectError> {
    let size = i64::from(self.input_size);
    let dims = vec![1, 3, size, size];
    let tensor = TensorRef::from_array_view((dims, input))
      .map_err(|e| DetectError::Inference(format!("构造输入张量失败: {}", e)))?;
    let inputs: SessionInputs<'_, '_, 0> =
      SessionInputs::ValueMap(vec![(Cow::Borrowed(INPUT_NAME), tensor.into())]);

    let mut session = self
      .session
      .lock()
      .map_err(|_| DetectError::Inference("推理会话锁已损坏".to_string()))?;
    let outputs = session
      .run(inputs)
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    let (shape, data) = outputs[OUTPUT_NAME]
      .try_extract_tensor::<f32>()
      .map_err(|e| DetectError::Inference(format!("读取输出张量失败: {}", e)))?;

    Ok((
      shape.iter().map(|&d| d.max(0) as usize).collect(),
      data.to_vec(),
    ))
  }
}

impl Detector for OnnxDetector {
  fn labels(&self) -> &LabelTable {
    &self.labels
  }

  fn detect(
    &self,
    source: &Path,
    image: &RgbImage,
    confidence: f32,
  ) -> Result<Vec<Detection>, DetectError> {
    let letterbox = Letterbox::fit(image.width(), image.height(), self.input_size);
    let input = yolo::to_chw(&letterbox.apply(image));

    let start = Instant::now();
    let (shape, data) = self.infer(&input)?;
    debug!("{} 推理耗时 {:?}，输出形状 {:?}", source.display(), start.elapsed(), shape);

    yolo::decode(
      &shape,
      &data,
      &self.labels,
      confidence,
      &letterbox,
      image.dimensions(),
    )
  }
}
