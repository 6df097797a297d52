// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

/// 检测模型
///
/// 模型被视为黑盒：输入一帧图像，输出若干 `{类别, 置信度, 边界框}`。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // 归一化坐标 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn empty() -> Self {
    Self {
      items: Vec::new().into_boxed_slice(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
  "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
  "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
  "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
  "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
  "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
  "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
  "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
  "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
  "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
  "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
  "hair drier", "toothbrush",
];

/// COCO 类别标签，超出 80 类的编号视为 `unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CocoLabel(u32);

impl CocoLabel {
  pub const PERSON: CocoLabel = CocoLabel(0);
  pub const BICYCLE: CocoLabel = CocoLabel(1);
  pub const CAR: CocoLabel = CocoLabel(2);
  pub const MOTORCYCLE: CocoLabel = CocoLabel(3);
  pub const BUS: CocoLabel = CocoLabel(5);
  pub const TRUCK: CocoLabel = CocoLabel(7);

  pub fn name(&self) -> &'static str {
    COCO_CLASSES
      .get(self.0 as usize)
      .copied()
      .unwrap_or("unknown")
  }

  pub fn from_name(name: &str) -> Option<Self> {
    COCO_CLASSES
      .iter()
      .position(|class| *class == name)
      .map(|id| CocoLabel(id as u32))
  }
}

impl WithLabel for CocoLabel {
  fn to_label_str(&self) -> String {
    self.name().to_string()
  }

  fn to_label_id(&self) -> u32 {
    self.0
  }

  fn from_label_id(id: u32) -> Self {
    CocoLabel(id)
  }
}

/// 服务端使用的检测模型
pub type DetectorModel =
  dyn Model<Input = RgbImage, Output = DetectResult<CocoLabel>, Error = ModelError> + Send + Sync;

#[cfg(feature = "model_yolo_onnx")]
mod yolo_onnx;
#[cfg(feature = "model_yolo_onnx")]
pub use self::yolo_onnx::{YoloOnnx, YoloOnnxBuilder, YoloOnnxError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_yolo_onnx")]
  #[error("ONNX 模型错误: {0}")]
  YoloOnnxError(#[from] YoloOnnxError),
  #[error("模型后端未启用, 请使用 `--features {0}` 重新编译")]
  BackendDisabled(&'static str),
  #[error("不支持的模型 URI 方案: {0}")]
  SchemeMismatch(String),
  #[error("推理失败: {0}")]
  Inference(String),
}

/// 模型后处理参数
#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
  pub confidence: f32,
  pub nms_threshold: f32,
}

impl Default for ModelOptions {
  fn default() -> Self {
    Self {
      confidence: 0.5,
      nms_threshold: 0.45,
    }
  }
}

/// 根据 URI 方案加载模型，例如 `onnx:///models/yolov8n.onnx`
pub fn load_model(url: &Url, options: ModelOptions) -> Result<Arc<DetectorModel>, ModelError> {
  info!("加载模型: {}", url);
  match url.scheme() {
    #[cfg(feature = "model_yolo_onnx")]
    yolo_onnx::YOLO_ONNX_SCHEME => {
      use crate::FromUrl;

      let model = YoloOnnxBuilder::from_url(url)?
        .confidence(options.confidence)
        .nms_threshold(options.nms_threshold)
        .build()?;
      Ok(Arc::new(model))
    }
    #[cfg(not(feature = "model_yolo_onnx"))]
    "onnx" => {
      let _ = options;
      Err(ModelError::BackendDisabled("model_yolo_onnx"))
    }
    scheme => Err(ModelError::SchemeMismatch(scheme.to_string())),
  }
}

/// 计算两个归一化边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 非极大值抑制，同类别内按置信度降序保留
pub fn nms<T: PartialEq>(mut items: Vec<DetectItem<T>>, threshold: f32) -> Vec<DetectItem<T>> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem<T>> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|best| best.kind == item.kind && iou(&best.bbox, &item.bbox) >= threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}
