// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{detector::ViolationDetector, storage::ViolationStore};

mod api;
mod error;
mod upload;
mod views;

pub use self::error::ApiError;
pub use self::upload::{UploadResponse, sanitize_filename};

/// multipart 头部与边界预留
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub upload_dir: PathBuf,
  pub results_dir: PathBuf,
  pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      upload_dir: PathBuf::from("uploads"),
      results_dir: PathBuf::from("static/results"),
      max_upload_bytes: 100 * 1024 * 1024,
    }
  }
}

/// 路由共享状态，存储与检测器均显式注入
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn ViolationStore>,
  pub detector: Arc<ViolationDetector>,
  pub config: Arc<ServerConfig>,
}

impl AppState {
  pub fn new(
    store: Arc<dyn ViolationStore>,
    detector: Arc<ViolationDetector>,
    config: ServerConfig,
  ) -> Self {
    Self {
      store,
      detector,
      config: Arc::new(config),
    }
  }
}

pub fn create_router(state: AppState) -> Router {
  let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
  let results = ServeDir::new(&state.config.results_dir);

  Router::new()
    .route("/", get(views::index))
    .route(
      "/upload",
      post(upload::upload_file).layer(DefaultBodyLimit::max(body_limit)),
    )
    .route("/results/{filename}", get(views::results))
    .route("/reports", get(views::reports))
    .route("/dashboard", get(views::dashboard))
    .route("/api/violations", get(api::violations))
    .route("/api/stats", get(api::stats))
    .route("/api/model", get(api::model_info))
    .nest_service("/static/results", results)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// 在阻塞线程池上执行存储或推理
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
}
