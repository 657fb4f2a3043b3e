// 该文件是 Toukui （头盔）项目的一部分。
// src/bin/helmet_serve.rs - 头盔检测 HTTP 服务
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
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use toukui::{
  config::{DEFAULT_PUBLIC_URL, ServeConfig},
  detection::{DEFAULT_CONFIDENCE, InferenceAdapter, LabelTable, load_detector},
  draw::{Draw, load_font},
  service::{InferenceService, router},
};

/// 头盔检测服务参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "TOUKUI_HOST", default_value = "127.0.0.1")]
  pub host: String,
  /// 监听端口
  #[arg(long, env = "TOUKUI_PORT", default_value_t = 8000)]
  pub port: u16,
  /// 模型权重路径（`.pt` 对应同目录下导出的 `.onnx`）
  #[arg(long, env = "TOUKUI_MODEL", value_name = "FILE", default_value = "model/best.pt")]
  pub weights: PathBuf,
  /// 上传文件目录
  #[arg(long, env = "TOUKUI_UPLOADS", default_value = "app/uploads")]
  pub uploads: PathBuf,
  /// 标注结果目录
  #[arg(long, env = "TOUKUI_RESULTS", default_value = "app/results")]
  pub results: PathBuf,
  /// `result_url` 前缀
  #[arg(long, env = "TOUKUI_PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
  pub public_url: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
  pub conf: f32,
  /// 标注字体（TrueType）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 上传大小上限（字节）
  #[arg(long, default_value_t = 32 * 1024 * 1024)]
  pub max_upload: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
  toukui::logging::init_tracing();

  let args = Args::parse();

  info!("模型文件路径: {}", args.weights.display());
  info!("上传目录: {}", args.uploads.display());
  info!("结果目录: {}", args.results.display());

  let detector = load_detector(&args.weights, LabelTable::helmet())
    .with_context(|| format!("无法加载模型 {}", args.weights.display()))?;
  let adapter = InferenceAdapter::new(detector, Draw::new(load_font(args.font.as_deref())));

  let config = ServeConfig {
    uploads_dir: args.uploads,
    results_dir: args.results,
    public_url: args.public_url,
    confidence: args.conf,
    max_upload_bytes: args.max_upload,
  };
  let service = Arc::new(InferenceService::new(adapter, &config)?);
  let app = router(service, config.max_upload_bytes);

  let addr = format!("{}:{}", args.host, args.port);
  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .with_context(|| format!("无法监听 {}", addr))?;
  info!("服务已启动: http://{}", addr);

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("收到中断信号，准备退出...");
    })
    .await?;

  info!("服务已退出");
  Ok(())
}
