// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/model/yolo_onnx.rs - ONNX Runtime YOLO 模型
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

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{CocoLabel, DetectItem, DetectResult, Model, ModelError, WithLabel, nms},
};

pub(crate) const YOLO_ONNX_SCHEME: &str = "onnx";

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_INPUT_NAME: &str = "images";
const YOLO_LETTERBOX_FILL: f32 = 114.0 / 255.0;
const YOLO_DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum YoloOnnxError {
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出形状不符合 [1, 4 + 类别数, 候选数]: {0:?}")]
  UnexpectedOutput(Vec<usize>),
}

/// YOLOv8 系列 ONNX 模型构建器
///
/// URL 形如 `onnx:///models/yolov8n.onnx?threads=2`。
pub struct YoloOnnxBuilder {
  model_path: PathBuf,
  confidence: f32,
  nms_threshold: f32,
  intra_threads: usize,
}

impl FromUrlWithScheme for YoloOnnxBuilder {
  const SCHEME: &'static str = YOLO_ONNX_SCHEME;
}

impl FromUrl for YoloOnnxBuilder {
  type Error = YoloOnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloOnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    if url.path().is_empty() {
      return Err(YoloOnnxError::ModelPathError("模型路径为空".to_string()));
    }

    let intra_threads = url
      .query_pairs()
      .find(|(k, _)| k == "threads")
      .and_then(|(_, v)| v.parse::<usize>().ok())
      .unwrap_or(YOLO_DEFAULT_THREADS);

    Ok(YoloOnnxBuilder {
      model_path: PathBuf::from(url.path()),
      confidence: 0.5,
      nms_threshold: 0.45,
      intra_threads,
    })
  }
}

impl YoloOnnxBuilder {
  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  pub fn build(self) -> Result<YoloOnnx, YoloOnnxError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      return Err(YoloOnnxError::ModelPathError(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;
    info!("模型加载完成");

    Ok(YoloOnnx {
      session,
      input_size: YOLO_INPUT_SIZE,
      confidence: self.confidence,
      nms_threshold: self.nms_threshold,
    })
  }
}

pub struct YoloOnnx {
  session: Session,
  input_size: u32,
  confidence: f32,
  nms_threshold: f32,
}

/// 等比缩放并居中填充后的输入张量
struct Letterbox {
  tensor: Array4<f32>,
  scale: f32,
  pad_x: f32,
  pad_y: f32,
}

fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
  let (width, height) = image.dimensions();
  let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
  let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
  let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let pad_x = (size - new_w) / 2;
  let pad_y = (size - new_h) / 2;

  // NCHW，像素归一化到 [0, 1]
  let side = size as usize;
  let mut tensor = Array4::<f32>::from_elem((1, 3, side, side), YOLO_LETTERBOX_FILL);
  for (x, y, pixel) in resized.enumerate_pixels() {
    let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
    for c in 0..3 {
      tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
    }
  }

  Letterbox {
    tensor,
    scale,
    pad_x: pad_x as f32,
    pad_y: pad_y as f32,
  }
}

impl YoloOnnx {
  fn run(&self, image: &RgbImage) -> Result<DetectResult<CocoLabel>, YoloOnnxError> {
    let (orig_w, orig_h) = (image.width() as f32, image.height() as f32);
    let input = letterbox(image, self.input_size);

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![YOLO_INPUT_NAME => input.tensor.view()]?)?;
    let output = outputs[0].try_extract_tensor::<f32>()?;

    // YOLOv8 输出: [1, 84, 8400]，84 = 4 个框坐标 + 80 个类别分数
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
      return Err(YoloOnnxError::UnexpectedOutput(shape));
    }
    let num_classes = shape[1] - 4;
    let num_boxes = shape[2];

    let mut items = Vec::new();
    for i in 0..num_boxes {
      let mut score = 0f32;
      let mut class_id = 0usize;
      for c in 0..num_classes {
        let s = output[[0, 4 + c, i]];
        if s > score {
          score = s;
          class_id = c;
        }
      }
      if score <= self.confidence {
        continue;
      }

      let cx = output[[0, 0, i]];
      let cy = output[[0, 1, i]];
      let bw = output[[0, 2, i]];
      let bh = output[[0, 3, i]];

      // 从 letterbox 坐标映射回原图的归一化坐标
      let to_x = |v: f32| ((v - input.pad_x) / input.scale / orig_w).clamp(0.0, 1.0);
      let to_y = |v: f32| ((v - input.pad_y) / input.scale / orig_h).clamp(0.0, 1.0);
      let bbox = [
        to_x(cx - bw / 2.0),
        to_y(cy - bh / 2.0),
        to_x(cx + bw / 2.0),
        to_y(cy + bh / 2.0),
      ];
      if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        continue;
      }

      items.push(DetectItem {
        kind: CocoLabel::from_label_id(class_id as u32),
        score: score.min(1.0),
        bbox,
      });
    }

    let items = nms(items, self.nms_threshold);
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

impl Model for YoloOnnx {
  type Input = RgbImage;
  type Output = DetectResult<CocoLabel>;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(self.run(input)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn letterbox_keeps_aspect_ratio() {
    let image = RgbImage::from_pixel(320, 160, image::Rgb([255, 0, 0]));
    let lb = letterbox(&image, 640);

    assert_eq!(lb.tensor.shape(), &[1, 3, 640, 640]);
    assert!((lb.scale - 2.0).abs() < 1e-6);
    assert_eq!(lb.pad_x, 0.0);
    assert_eq!(lb.pad_y, 160.0);
    assert!((lb.tensor[[0, 0, 320, 320]] - 1.0).abs() < 1e-6);
    assert!((lb.tensor[[0, 0, 10, 320]] - YOLO_LETTERBOX_FILL).abs() < 1e-6);
  }

  #[test]
  fn builder_reads_threads_from_query() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?threads=2").unwrap();
    let builder = YoloOnnxBuilder::from_url(&url).unwrap();
    assert_eq!(builder.intra_threads, 2);
    assert_eq!(builder.model_path, PathBuf::from("/models/yolov8n.onnx"));
  }

  #[test]
  fn missing_model_file_fails_to_build() {
    let url = Url::parse("onnx:///nonexistent/yolo.onnx").unwrap();
    let err = YoloOnnxBuilder::from_url(&url).unwrap().build().err().unwrap();
    assert!(matches!(err, YoloOnnxError::ModelPathError(_)));
  }
}
