// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/server/error.rs - HTTP 错误响应
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

use axum::{
  Json,
  extract::multipart::MultipartError,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{storage::StorageError, task::PipelineError};

/// 返回给客户端的错误，统一渲染为 `{success: false, error}`
#[derive(Error, Debug)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  PayloadTooLarge(String),
  #[error("Processing failed: {0}")]
  Processing(#[from] PipelineError),
  #[error("Storage error: {0}")]
  Storage(#[from] StorageError),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Processing(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }
}

impl From<MultipartError> for ApiError {
  fn from(err: MultipartError) -> Self {
    // 超出请求体上限时 axum 给出 413
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
      ApiError::PayloadTooLarge(format!("File too large: {}", err.body_text()))
    } else {
      ApiError::BadRequest(format!("Invalid multipart request: {}", err.body_text()))
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = json!({
      "success": false,
      "error": self.to_string(),
    });
    (self.status(), Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::InputError;

  #[test]
  fn statuses_follow_error_class() {
    assert_eq!(
      ApiError::BadRequest("Invalid file type".into()).status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      ApiError::PayloadTooLarge("big".into()).status(),
      StatusCode::PAYLOAD_TOO_LARGE
    );
    let processing = ApiError::from(PipelineError::from(InputError::VideoDisabled));
    assert_eq!(processing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(processing.to_string().starts_with("Processing failed: "));
  }
}
