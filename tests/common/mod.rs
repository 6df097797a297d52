// 该文件是 Weizhang （违章识别） 项目的一部分。
// tests/common/mod.rs - 集成测试公共组件
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

#![allow(dead_code)]

use std::{collections::BTreeMap, io::Cursor, path::PathBuf, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Request, Response, header},
};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use weizhang::{
  detector::ViolationDetector,
  model::{CocoLabel, DetectItem, DetectResult, DetectorModel, Model, ModelError},
  output::OutputWrapper,
  server::{AppState, ServerConfig, create_router},
  storage::{
    NewViolation, SqliteStore, StorageError, ViolationRecord, ViolationStats, ViolationStore,
  },
  violation::ViolationType,
};

pub const BOUNDARY: &str = "weizhang-test-boundary";

/// 每次推理都返回同一组检测结果
pub struct StubModel(pub Vec<DetectItem<CocoLabel>>);

impl StubModel {
  pub fn person(score: f32) -> Self {
    StubModel(vec![DetectItem {
      kind: CocoLabel::PERSON,
      score,
      bbox: [0.25, 0.2, 0.55, 0.9],
    }])
  }

  pub fn nothing() -> Self {
    StubModel(Vec::new())
  }
}

impl Model for StubModel {
  type Input = RgbImage;
  type Output = DetectResult<CocoLabel>;
  type Error = ModelError;

  fn infer(&self, _input: &RgbImage) -> Result<Self::Output, Self::Error> {
    Ok(DetectResult::from(self.0.clone()))
  }
}

pub struct FailingModel;

impl Model for FailingModel {
  type Input = RgbImage;
  type Output = DetectResult<CocoLabel>;
  type Error = ModelError;

  fn infer(&self, _input: &RgbImage) -> Result<Self::Output, Self::Error> {
    Err(ModelError::Inference("session crashed".to_string()))
  }
}

/// 写入总是失败的存储
pub struct FailingStore;

impl ViolationStore for FailingStore {
  fn insert(&self, _record: &NewViolation) -> Result<i64, StorageError> {
    Err(StorageError::Poisoned)
  }

  fn list_all(&self) -> Result<Vec<ViolationRecord>, StorageError> {
    Ok(Vec::new())
  }

  fn list_by_filename(&self, _filename: &str) -> Result<Vec<ViolationRecord>, StorageError> {
    Ok(Vec::new())
  }

  fn aggregate_counts(&self) -> Result<BTreeMap<ViolationType, u64>, StorageError> {
    Ok(BTreeMap::new())
  }

  fn stats(&self, _now: DateTime<Utc>) -> Result<ViolationStats, StorageError> {
    Ok(ViolationStats {
      total_violations: 0,
      violations_by_type: BTreeMap::new(),
      recent_violations: 0,
      avg_confidence: 0.0,
    })
  }
}

pub struct TestApp {
  pub router: Router,
  pub store: Arc<dyn ViolationStore>,
  pub upload_dir: PathBuf,
  pub results_dir: PathBuf,
  _dir: TempDir,
}

pub struct TestAppBuilder {
  model: Arc<DetectorModel>,
  store: Option<Arc<dyn ViolationStore>>,
  max_upload_bytes: usize,
}

impl TestAppBuilder {
  pub fn new<M>(model: M) -> Self
  where
    M: Model<Input = RgbImage, Output = DetectResult<CocoLabel>, Error = ModelError>
      + Send
      + Sync
      + 'static,
  {
    Self {
      model: Arc::new(model),
      store: None,
      max_upload_bytes: 10 * 1024 * 1024,
    }
  }

  pub fn store(mut self, store: Arc<dyn ViolationStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
    self.max_upload_bytes = max_upload_bytes;
    self
  }

  pub fn build(self) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let results_dir = dir.path().join("static").join("results");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&results_dir).unwrap();

    let store = self.store.unwrap_or_else(|| {
      let store: Arc<dyn ViolationStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
      store
    });

    let detector =
      ViolationDetector::new(self.model, "stub://detector").with_output(output(&results_dir));
    let config = ServerConfig {
      upload_dir: upload_dir.clone(),
      results_dir: results_dir.clone(),
      max_upload_bytes: self.max_upload_bytes,
    };
    let router = create_router(AppState::new(store.clone(), Arc::new(detector), config));

    TestApp {
      router,
      store,
      upload_dir,
      results_dir,
      _dir: dir,
    }
  }
}

#[cfg(feature = "save_image_file")]
fn output(results_dir: &std::path::Path) -> OutputWrapper {
  use weizhang::output::{SaveImageFileOutput, draw::Draw};
  OutputWrapper::SaveImageFile(SaveImageFileOutput::new(results_dir, Draw::with_font(None)))
}

#[cfg(not(feature = "save_image_file"))]
fn output(_results_dir: &std::path::Path) -> OutputWrapper {
  OutputWrapper::Discard
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
  let image = RgbImage::from_fn(width, height, |x, y| {
    image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
  });
  let mut bytes = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
    .unwrap();
  bytes
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
       Content-Type: application/octet-stream\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

pub fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri("/upload")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(multipart_body(field, filename, data)))
    .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
  Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
  router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
  axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap()
    .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
  serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
  String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn file_count(dir: &std::path::Path) -> usize {
  std::fs::read_dir(dir).unwrap().count()
}
