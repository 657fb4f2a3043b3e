// 该文件是 Toukui （头盔）项目的一部分。
// src/service/http.rs - HTTP 接口
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

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, Path, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::{InferenceService, PredictionResponse, ServiceError, Upload};

const UPLOAD_FIELD: &str = "file";

impl ServiceError {
  pub fn status(&self) -> StatusCode {
    match self {
      ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
      ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
      ServiceError::Inference(_) | ServiceError::Write(_) | ServiceError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }
}

impl IntoResponse for ServiceError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求失败: {}", self);
    } else {
      warn!("请求被拒绝: {}", self);
    }
    (status, Json(json!({ "detail": self.to_string() }))).into_response()
  }
}

/// 构建路由；推理在阻塞线程池中执行
pub fn router(service: Arc<InferenceService>, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/", get(root))
    .route("/predict/", post(predict))
    .route("/predict", post(predict))
    .route("/download/:image_name", get(download))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .with_state(service)
}

async fn root() -> Json<serde_json::Value> {
  Json(json!({ "message": "Helmet Detection API is running!" }))
}

async fn predict(
  State(service): State<Arc<InferenceService>>,
  mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ServiceError> {
  let mut upload = None;
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ServiceError::Validation(e.to_string()))?
  {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }
    let filename = field.file_name().map(str::to_owned);
    let content_type = field.content_type().map(str::to_owned);
    let data = field
      .bytes()
      .await
      .map_err(|e| ServiceError::Validation(e.to_string()))?;
    upload = Some(Upload {
      filename,
      content_type,
      data: data.to_vec(),
    });
    break;
  }

  let upload = upload.ok_or_else(|| {
    ServiceError::Validation(format!("Missing multipart field '{}'", UPLOAD_FIELD))
  })?;

  let response = tokio::task::spawn_blocking(move || service.predict(upload))
    .await
    .map_err(|e| ServiceError::Internal(e.to_string()))??;
  Ok(Json(response))
}

async fn download(
  State(service): State<Arc<InferenceService>>,
  Path(image_name): Path<String>,
) -> Result<Response, ServiceError> {
  let disposition = format!(
    "attachment; filename*=utf-8''{}",
    urlencoding::encode(&image_name)
  );
  let bytes = tokio::task::spawn_blocking(move || service.download(&image_name))
    .await
    .map_err(|e| ServiceError::Internal(e.to_string()))??;

  Ok(
    (
      [
        (header::CONTENT_TYPE, "image/jpeg".to_string()),
        (header::CONTENT_DISPOSITION, disposition),
      ],
      bytes,
    )
      .into_response(),
  )
}
