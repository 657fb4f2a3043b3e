// 该文件是 Toukui （头盔）项目的一部分。
// src/service.rs - 单请求推理服务
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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::ServeConfig;
use crate::detection::{DetectError, Detection, InferenceAdapter};
use crate::naming::{self, ArtifactRole};
use crate::store::{ResultStore, StoreError};

#[cfg(feature = "server")]
mod http;
#[cfg(feature = "server")]
pub use self::http::router;

#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("{0}")]
  Validation(String),
  #[error("Inference failed: {0}")]
  Inference(String),
  #[error("Result not found: {0}")]
  NotFound(String),
  #[error("Write failed: {0}")]
  Write(String),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl From<StoreError> for ServiceError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::InvalidName(name) => ServiceError::Validation(format!("Invalid file name: {name:?}")),
      StoreError::NotFound(name) => ServiceError::NotFound(name),
      e @ (StoreError::Write { .. } | StoreError::Io { .. }) => ServiceError::Write(e.to_string()),
    }
  }
}

impl From<DetectError> for ServiceError {
  fn from(err: DetectError) -> Self {
    match err {
      e @ DetectError::Decode { .. } => ServiceError::Validation(e.to_string()),
      e => ServiceError::Inference(e.to_string()),
    }
  }
}

/// 上传的文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: Option<String>,
  pub content_type: Option<String>,
  pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBody {
  pub class_id: u32,
  pub label: String,
  pub confidence: f64,
  #[serde(rename = "box")]
  pub bbox: [f64; 4],
}

impl From<&Detection> for DetectionBody {
  fn from(d: &Detection) -> Self {
    Self {
      class_id: d.class_id,
      label: d.label.clone(),
      confidence: (f64::from(d.confidence) * 1000.0).round() / 1000.0,
      bbox: d.bbox.map(f64::from),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
  pub filename: String,
  pub detections: Vec<DetectionBody>,
  pub result_url: String,
}

/// 推理服务：保存上传、推理、保存标注结果
///
/// 每次调用是一次同步推理，会阻塞当前线程；并发由调用方的多个工作线程提供。
pub struct InferenceService {
  adapter: InferenceAdapter,
  store: ResultStore,
  uploads_dir: PathBuf,
  public_url: Url,
}

impl InferenceService {
  pub fn new(adapter: InferenceAdapter, config: &ServeConfig) -> Result<Self, ServiceError> {
    std::fs::create_dir_all(&config.uploads_dir).map_err(|e| {
      ServiceError::Write(format!("{}: {}", config.uploads_dir.display(), e))
    })?;
    let store = ResultStore::open(&config.results_dir)?;

    let mut public_url = config.public_url.clone();
    if !public_url.path().ends_with('/') {
      let path = format!("{}/", public_url.path());
      public_url.set_path(&path);
    }

    Ok(Self {
      adapter: adapter.with_confidence(config.confidence),
      store,
      uploads_dir: config.uploads_dir.clone(),
      public_url,
    })
  }

  pub fn store(&self) -> &ResultStore {
    &self.store
  }

  pub fn result_url(&self, filename: &str) -> Result<Url, ServiceError> {
    self
      .public_url
      .join(&format!("download/{}", urlencoding::encode(filename)))
      .map_err(|e| ServiceError::Internal(e.to_string()))
  }

  pub fn predict(&self, upload: Upload) -> Result<PredictionResponse, ServiceError> {
    let is_image = upload
      .content_type
      .as_deref()
      .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
      return Err(ServiceError::Validation(
        "Only image files are supported".to_string(),
      ));
    }

    let id = self.store.allocate_identifier();
    let input_path = naming::output_path(&self.uploads_dir, &id, ArtifactRole::Upload);
    std::fs::write(&input_path, &upload.data)
      .map_err(|e| ServiceError::Write(format!("{}: {}", input_path.display(), e)))?;

    let prediction = self.adapter.predict_path(&input_path)?;
    self.store.save(&id, &prediction.annotated)?;

    let result_name = ResultStore::file_name(&id);
    let result_url = self.result_url(&result_name)?;
    info!(
      "请求 {} 完成，检测到 {} 个目标",
      id,
      prediction.detections.len()
    );

    Ok(PredictionResponse {
      filename: upload.filename.unwrap_or_else(|| "upload".to_string()),
      detections: prediction.detections.iter().map(DetectionBody::from).collect(),
      result_url: result_url.to_string(),
    })
  }

  pub fn download(&self, image_name: &str) -> Result<Vec<u8>, ServiceError> {
    Ok(self.store.fetch(image_name)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confidence_is_rounded() {
    let d = Detection::new(0, "helmet", 0.87654, [1.0, 2.0, 3.0, 4.0]).unwrap();
    let body = DetectionBody::from(&d);
    assert_eq!(body.confidence, 0.877);
    assert_eq!(body.bbox, [1.0, 2.0, 3.0, 4.0]);

    let json = serde_json::to_value(&body).unwrap();
    assert!(json.get("box").is_some());
  }

  #[test]
  fn error_mapping() {
    let e: ServiceError = StoreError::InvalidName("../x".into()).into();
    assert!(matches!(e, ServiceError::Validation(_)));
    let e: ServiceError = StoreError::NotFound("x".into()).into();
    assert!(matches!(e, ServiceError::NotFound(_)));
    let e: ServiceError = DetectError::Inference("boom".into()).into();
    assert!(matches!(e, ServiceError::Inference(_)));
  }
}
