// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{collections::BTreeMap, rc::Rc};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  input::InputError,
  model::{DetectResult, Model, ModelError, WithLabel},
  output::{OutputError, Render, result_image_name},
  violation::{Mapping, Violation, ViolationTable, ViolationType},
};

pub trait Task<I, M: ?Sized, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("{0}")]
  Input(#[from] InputError),
  #[error("{0}")]
  Model(#[from] ModelError),
  #[error("No frames decoded from input")]
  NoFrames,
}

/// 一条待渲染的违章及其来源帧
struct Candidate {
  frame: Rc<Frame>,
  detection_index: usize,
  violation: Violation,
}

/// 对一个上传文件的所有帧执行检测、映射与标注
pub struct DetectionTask<'a> {
  source_stem: &'a str,
  table: &'a ViolationTable,
  keep_best_per_type: bool,
}

impl<'a> DetectionTask<'a> {
  pub fn new(source_stem: &'a str, table: &'a ViolationTable) -> Self {
    Self {
      source_stem,
      table,
      keep_best_per_type: false,
    }
  }

  /// 每种违章只保留置信度最高的一条
  pub fn keep_best_per_type(mut self, keep: bool) -> Self {
    self.keep_best_per_type = keep;
    self
  }

  fn map_frame<T: WithLabel>(&self, frame: &Rc<Frame>, result: &DetectResult<T>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for item in result.items.iter() {
      match self.table.map(&item.kind, item.score) {
        Mapping::Violation(violation_type) => {
          let detection_index = candidates.len();
          candidates.push(Candidate {
            frame: frame.clone(),
            detection_index,
            violation: Violation {
              violation_type,
              confidence: item.score,
              bbox: item.bbox,
              frame_index: frame.index,
              result_image: None,
            },
          });
        }
        Mapping::InvalidScore => {
          warn!(
            "丢弃置信度异常的检测结果: {} {}",
            item.kind.to_label_str(),
            item.score
          );
        }
        Mapping::BelowThreshold | Mapping::NoMapping => {}
      }
    }
    candidates
  }

  fn render<O>(&self, output: &O, candidate: Candidate) -> Violation
  where
    O: Render<Frame, Violation, Rendered = Option<String>, Error = OutputError>,
  {
    let Candidate {
      frame,
      detection_index,
      mut violation,
    } = candidate;
    let name = result_image_name(self.source_stem, frame.index, detection_index);
    violation.result_image = match output.render_result(&frame, &violation, &name) {
      Ok(rendered) => rendered,
      Err(e) => {
        warn!("保存标注图像失败 {}: {}", name, e);
        None
      }
    };
    violation
  }
}

impl<'a, I, M, O, T> Task<I, M, O> for DetectionTask<'a>
where
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Model<Input = RgbImage, Output = DetectResult<T>, Error = ModelError> + ?Sized,
  O: Render<Frame, Violation, Rendered = Option<String>, Error = OutputError>,
  T: WithLabel,
{
  type Output = Vec<Violation>;
  type Error = PipelineError;

  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    info!("开始检测: {}", self.source_stem);
    let mut candidates = Vec::new();
    let mut best: BTreeMap<ViolationType, Candidate> = BTreeMap::new();
    let mut frames = 0usize;

    for frame in input {
      let frame = Rc::new(frame?);
      frames += 1;

      let now = std::time::Instant::now();
      let result = model.infer(&frame.image)?;
      debug!(
        "第 {} 帧推理完成, {} 个目标, 耗时: {:.2?}",
        frame.index,
        result.len(),
        now.elapsed()
      );

      for candidate in self.map_frame(&frame, &result) {
        if !self.keep_best_per_type {
          candidates.push(candidate);
          continue;
        }
        let violation_type = candidate.violation.violation_type;
        let replace = best
          .get(&violation_type)
          .is_none_or(|kept| candidate.violation.confidence > kept.violation.confidence);
        if replace {
          best.insert(violation_type, candidate);
        }
      }
    }

    if frames == 0 {
      warn!("未解码出任何帧: {}", self.source_stem);
      return Err(PipelineError::NoFrames);
    }

    if self.keep_best_per_type {
      candidates = best.into_values().collect();
    }

    let violations: Vec<Violation> = candidates
      .into_iter()
      .map(|candidate| self.render(output, candidate))
      .collect();
    info!(
      "检测完成: {}, 处理 {} 帧, 发现 {} 条违章",
      self.source_stem,
      frames,
      violations.len()
    );
    Ok(violations)
  }
}
