// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/server/api.rs - JSON 接口
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

use axum::{Json, extract::State};
use chrono::Utc;

use crate::{
  detector::ModelInfo,
  server::{ApiError, AppState, run_blocking},
  storage::{ViolationRecord, ViolationStats},
};

/// `GET /api/violations`
pub async fn violations(
  State(state): State<AppState>,
) -> Result<Json<Vec<ViolationRecord>>, ApiError> {
  let store = state.store.clone();
  let records = run_blocking(move || Ok(store.list_all()?)).await?;
  Ok(Json(records))
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<ViolationStats>, ApiError> {
  let store = state.store.clone();
  let stats = run_blocking(move || Ok(store.stats(Utc::now())?)).await?;
  Ok(Json(stats))
}

/// `GET /api/model`
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
  Json(state.detector.info())
}
