// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;

use crate::{frame::Frame, violation::Violation};

/// 将一条检测结果渲染到某个输出
///
/// `name` 为输出的文件名（不含目录），由调用方保证唯一。
pub trait Render<Frame, Item> {
  type Rendered;
  type Error;
  fn render_result(
    &self,
    frame: &Frame,
    item: &Item,
    name: &str,
  ) -> Result<Self::Rendered, Self::Error>;
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

/// 标注图文件名: `{stem}_frame{N}_det{I}.jpg`
pub fn result_image_name(stem: &str, frame_index: u64, detection_index: usize) -> String {
  format!("{}_frame{}_det{}.jpg", stem, frame_index, detection_index)
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileOutput),
  /// 不生成标注图
  Discard,
}

impl Render<Frame, Violation> for OutputWrapper {
  /// 生成的标注图文件名
  type Rendered = Option<String>;
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &Frame,
    item: &Violation,
    name: &str,
  ) -> Result<Self::Rendered, Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output
        .render_result(frame, item, name)
        .map(Some)
        .map_err(OutputError::from),
      OutputWrapper::Discard => {
        let _ = (frame, item, name);
        Ok(None)
      }
    }
  }
}
