// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/detector.rs - 违章检测器
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

use std::{path::Path, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::{
  input::{FrameSampling, InputWrapper, MediaKind},
  model::DetectorModel,
  output::OutputWrapper,
  task::{DetectionTask, PipelineError, Task},
  violation::{Violation, ViolationTable, ViolationType},
};

/// 检测器状态，对应 `GET /api/model`
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
  pub status: &'static str,
  pub model: String,
  pub violation_classes: Vec<ViolationType>,
}

/// 包装预训练模型：解码文件、推理、映射违章类别并输出标注图
pub struct ViolationDetector {
  model: Arc<DetectorModel>,
  source: String,
  table: ViolationTable,
  output: OutputWrapper,
  sampling: FrameSampling,
  keep_best_per_type: bool,
}

impl ViolationDetector {
  pub fn new(model: Arc<DetectorModel>, source: impl Into<String>) -> Self {
    Self {
      model,
      source: source.into(),
      table: ViolationTable::coco(),
      output: OutputWrapper::Discard,
      sampling: FrameSampling::default(),
      keep_best_per_type: true,
    }
  }

  pub fn with_table(mut self, table: ViolationTable) -> Self {
    self.table = table;
    self
  }

  pub fn with_output(mut self, output: OutputWrapper) -> Self {
    self.output = output;
    self
  }

  pub fn with_sampling(mut self, sampling: FrameSampling) -> Self {
    self.sampling = sampling;
    self
  }

  /// 仅作用于视频
  pub fn keep_best_per_type(mut self, keep: bool) -> Self {
    self.keep_best_per_type = keep;
    self
  }

  /// 对一个已保存的上传文件执行检测
  pub fn detect_file(&self, path: &Path) -> Result<Vec<Violation>, PipelineError> {
    let stem = result_stem(path);
    let keep_best = self.keep_best_per_type && MediaKind::from_path(path) == Some(MediaKind::Video);

    info!("处理文件: {}", path.display());
    let input = InputWrapper::open(path, self.sampling)?;
    DetectionTask::new(&stem, &self.table)
      .keep_best_per_type(keep_best)
      .run_task(input, self.model.as_ref(), &self.output)
  }

  pub fn info(&self) -> ModelInfo {
    ModelInfo {
      status: "loaded",
      model: self.source.clone(),
      violation_classes: self.table.violation_classes(),
    }
  }
}

/// 标注图像的文件名前缀: 完整文件名中的 `.` 替换为 `_`
fn result_stem(path: &Path) -> String {
  path
    .file_name()
    .and_then(|s| s.to_str())
    .unwrap_or("upload")
    .replace('.', "_")
}
