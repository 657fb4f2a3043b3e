#![cfg(feature = "server")]

mod common;

use std::sync::Arc;

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

use common::*;
use toukui::{
  config::ServeConfig,
  detection::{Detection, Detector, InferenceAdapter},
  draw::Draw,
  service::{InferenceService, router},
};

struct TestApp {
  app: Router,
  dir: TempDir,
}

impl TestApp {
  fn new(detector: Box<dyn Detector>) -> Self {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let config = ServeConfig {
      uploads_dir: dir.path().join("uploads"),
      results_dir: dir.path().join("results"),
      public_url: Url::parse("http://testserver/").unwrap(),
      ..ServeConfig::default()
    };
    let adapter = InferenceAdapter::new(detector, Draw::default());
    let service = InferenceService::new(adapter, &config).expect("Failed to build service");
    Self {
      app: router(Arc::new(service), config.max_upload_bytes),
      dir,
    }
  }

  fn with_sidecar() -> Self {
    Self::new(Box::new(SidecarDetector::new()))
  }

  fn results_dir(&self) -> std::path::PathBuf {
    self.dir.path().join("results")
  }

  async fn upload(&self, filename: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
    let request = Request::builder()
      .method("POST")
      .uri("/predict/")
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(multipart_body("file", filename, content_type, data)))
      .unwrap();
    let response = self.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
  }

  async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = self.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
  }
}

#[tokio::test]
async fn root_reports_running() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  let (status, body) = app.get("/").await;
  assert_eq!(status, StatusCode::OK);
  let body: Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(body["message"], "Helmet Detection API is running!");
}

#[tokio::test]
async fn black_image_has_no_detections_and_result_is_downloadable() {
  let app = TestApp::with_sidecar();
  let (status, body) = app.upload("black.jpg", "image/jpeg", &black_jpeg(10, 10)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["filename"], "black.jpg");
  assert_eq!(body["detections"], Value::Array(Vec::new()));

  let result_url = Url::parse(body["result_url"].as_str().unwrap()).unwrap();
  let name = result_url.path().trim_start_matches("/download/").to_string();
  assert!(name.ends_with("_result.jpg"));

  let (status, bytes) = app.get(result_url.path()).await;
  assert_eq!(status, StatusCode::OK);
  let on_disk = std::fs::read(app.results_dir().join(&name)).unwrap();
  assert_eq!(bytes, on_disk);

  // 上传的原图同样保留
  let id = name.trim_end_matches("_result.jpg");
  assert!(app.dir.path().join("uploads").join(format!("{id}.jpg")).is_file());
}

#[tokio::test]
async fn detections_are_filtered_and_rounded() {
  let detections = vec![
    Detection::new(0, "helmet", 0.87654, [1.0, 1.0, 8.0, 8.0]).unwrap(),
    Detection::new(1, "no_helmet", 0.1, [2.0, 2.0, 6.0, 6.0]).unwrap(),
  ];
  let app = TestApp::new(Box::new(FixedDetector::new(detections)));
  let (status, body) = app.upload("a.png", "image/png", &black_jpeg(10, 10)).await;
  assert_eq!(status, StatusCode::OK);

  let detections = body["detections"].as_array().unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0]["class_id"], 0);
  assert_eq!(detections[0]["label"], "helmet");
  assert_eq!(detections[0]["confidence"], 0.877);
  assert_eq!(detections[0]["box"], serde_json::json!([1.0, 1.0, 8.0, 8.0]));
}

#[tokio::test]
async fn non_image_upload_is_rejected_without_writing() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  let (status, body) = app.upload("notes.txt", "text/plain", b"hello").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["detail"].is_string());
  assert_eq!(count_files(&app.results_dir()), 0);
  assert_eq!(count_files(&app.dir.path().join("uploads")), 0);
}

#[tokio::test]
async fn undecodable_image_is_a_client_error() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  let (status, _) = app.upload("broken.jpg", "image/jpeg", b"not really a jpeg").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(count_files(&app.results_dir()), 0);
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  let request = Request::builder()
    .method("POST")
    .uri("/predict")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(multipart_body("image", "a.jpg", "image/jpeg", &black_jpeg(4, 4))))
    .unwrap();
  let response = app.app.clone().oneshot(request).await.unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_of_unknown_file_is_not_found() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  let (status, body) = app.get("/download/nothing_result.jpg").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let body: Value = serde_json::from_slice(&body).unwrap();
  assert!(body["detail"].is_string());
}

#[tokio::test]
async fn download_rejects_path_traversal() {
  let app = TestApp::new(Box::new(FixedDetector::empty()));
  std::fs::write(app.dir.path().join("secret.txt"), b"secret").unwrap();

  let (status, body) = app.get("/download/..%2Fsecret.txt").await;
  assert!(status.is_client_error());
  assert_ne!(body, b"secret");
}
