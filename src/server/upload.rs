// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/server/upload.rs - 文件上传与检测
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

use std::path::{Path, PathBuf};

use axum::{
  Json,
  extract::{Multipart, State},
};
use chrono::{Local, Utc};
use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{error, info, warn};

use crate::{
  input::MediaKind,
  server::{ApiError, AppState, run_blocking},
  storage::NewViolation,
  violation::Violation,
};

const UPLOAD_FIELD: &str = "file";
const MAX_COLLISION_SUFFIX: u32 = 10_000;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
  pub success: bool,
  pub results: Vec<Violation>,
  pub filename: String,
  pub persisted: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// 清洗客户端文件名，返回 `(stem, extension)`
///
/// 扩展名不在允许列表中时返回 `None`。stem 只保留 ASCII 字母数字与
/// `.`、`-`、`_`，空白替换为 `_`，去掉开头的 `.`，为空时使用 `upload`。
pub fn sanitize_filename(original: &str) -> Option<(String, String)> {
  // 浏览器可能带上客户端路径
  let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
  let (stem, extension) = base.rsplit_once('.')?;
  MediaKind::from_extension(extension)?;

  let cleaned: String = stem
    .chars()
    .filter_map(|c| match c {
      c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
      c if c.is_whitespace() => Some('_'),
      _ => None,
    })
    .collect();
  let cleaned = cleaned.trim_start_matches('.');
  let stem = if cleaned.is_empty() { "upload" } else { cleaned };

  Some((stem.to_string(), extension.to_ascii_lowercase()))
}

fn candidate_name(prefix: &str, stem: &str, extension: &str, suffix: u32) -> String {
  if suffix == 0 {
    format!("{}_{}.{}", prefix, stem, extension)
  } else {
    format!("{}_{}_{}.{}", prefix, stem, suffix, extension)
  }
}

/// 以不覆盖的方式写入上传文件，重名时追加 `_1`、`_2`……
async fn store_upload(
  dir: &Path,
  stem: &str,
  extension: &str,
  data: &[u8],
) -> Result<(String, PathBuf), ApiError> {
  tokio::fs::create_dir_all(dir)
    .await
    .map_err(|e| ApiError::Internal(format!("failed to create upload directory: {}", e)))?;

  let prefix = Local::now().format("%Y%m%d_%H%M%S").to_string();
  for suffix in 0..MAX_COLLISION_SUFFIX {
    let name = candidate_name(&prefix, stem, extension, suffix);
    let path = dir.join(&name);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
      Ok(file) => file,
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
      Err(e) => return Err(ApiError::Internal(format!("failed to save upload: {}", e))),
    };

    let written = async {
      file.write_all(data).await?;
      file.flush().await
    }
    .await;
    if let Err(e) = written {
      drop(file);
      if let Err(remove_err) = tokio::fs::remove_file(&path).await {
        warn!("清理未写完的上传文件失败 {}: {}", path.display(), remove_err);
      }
      return Err(ApiError::Internal(format!("failed to save upload: {}", e)));
    }
    return Ok((name, path));
  }

  Err(ApiError::Internal(format!(
    "too many uploads named {}.{}",
    stem, extension
  )))
}

/// 读取 `file` 字段，边读边检查大小
async fn read_upload(
  multipart: &mut Multipart,
  max_bytes: usize,
) -> Result<(String, String, Vec<u8>), ApiError> {
  while let Some(mut field) = multipart.next_field().await? {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }

    let original = field.file_name().unwrap_or_default().to_string();
    if original.is_empty() {
      return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    let (stem, extension) = sanitize_filename(&original)
      .ok_or_else(|| ApiError::BadRequest("Invalid file type".to_string()))?;

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await? {
      if data.len() + chunk.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
          "File too large: limit is {} bytes",
          max_bytes
        )));
      }
      data.extend_from_slice(&chunk);
    }
    return Ok((stem, extension, data));
  }

  Err(ApiError::BadRequest("No file selected".to_string()))
}

/// `POST /upload`
pub async fn upload_file(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
  let (stem, extension, data) = read_upload(&mut multipart, state.config.max_upload_bytes)
    .await
    .inspect_err(|e| warn!("拒绝上传: {}", e))?;

  let (filename, path) = store_upload(&state.config.upload_dir, &stem, &extension, &data).await?;
  drop(data);
  info!("保存上传文件: {}", path.display());

  let detector = state.detector.clone();
  let detect_path = path.clone();
  let results = run_blocking(move || Ok(detector.detect_file(&detect_path)?))
    .await
    .inspect_err(|e| error!("检测失败 {}: {}", path.display(), e))?;

  let records: Vec<NewViolation> = results
    .iter()
    .map(|violation| NewViolation {
      filename: filename.clone(),
      violation_type: violation.violation_type,
      confidence: violation.confidence,
      timestamp: Utc::now(),
      result_image: violation.result_image.clone(),
    })
    .collect();

  let (persisted, persist_error) = if records.is_empty() {
    (true, None)
  } else {
    let store = state.store.clone();
    match run_blocking(move || Ok(store.insert_all(&records)?)).await {
      Ok(ids) => {
        info!("保存 {} 条违章记录: {}", ids.len(), filename);
        (true, None)
      }
      Err(e) => {
        error!("保存违章记录失败 {}: {}", filename, e);
        (false, Some(format!("Failed to save results: {}", e)))
      }
    }
  };

  Ok(Json(UploadResponse {
    success: true,
    results,
    filename,
    persisted,
    error: persist_error,
  }))
}
