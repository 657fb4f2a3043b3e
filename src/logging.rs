// 该文件是 Toukui （头盔）项目的一部分。
// src/logging.rs - 日志初始化
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

use tracing_subscriber::EnvFilter;

/// 未设置 `RUST_LOG` 时的日志级别
pub const DEFAULT_DIRECTIVE: &str = "info";

/// 根据过滤指令构建过滤器；指令缺失或无效时使用 [`DEFAULT_DIRECTIVE`]
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
  match directives {
    Some(d) if !d.trim().is_empty() => EnvFilter::try_new(d).unwrap_or_else(|e| {
      eprintln!("RUST_LOG 无效 ({}): {}，使用 {}", d, e, DEFAULT_DIRECTIVE);
      EnvFilter::new(DEFAULT_DIRECTIVE)
    }),
    _ => EnvFilter::new(DEFAULT_DIRECTIVE),
  }
}

/// 初始化日志输出，遵循 `RUST_LOG`
pub fn init_tracing() {
  let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
  tracing_subscriber::fmt()
    .with_env_filter(filter_from(directives.as_deref()))
    .init();
}
