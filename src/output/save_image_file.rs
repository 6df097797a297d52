// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  output::{Render, draw::Draw},
  violation::Violation,
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("非法的文件名: {0}")]
  InvalidName(String),
}

/// 将标注图保存到结果目录
pub struct SaveImageFileOutput {
  directory: PathBuf,
  draw: Draw,
}

impl SaveImageFileOutput {
  pub fn new(directory: impl Into<PathBuf>, draw: Draw) -> Self {
    Self {
      directory: directory.into(),
      draw,
    }
  }

  pub fn directory(&self) -> &std::path::Path {
    &self.directory
  }
}

impl Render<Frame, Violation> for SaveImageFileOutput {
  type Rendered = String;
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &Frame,
    item: &Violation,
    name: &str,
  ) -> Result<Self::Rendered, Self::Error> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
      return Err(SaveImageFileError::InvalidName(name.to_string()));
    }

    std::fs::create_dir_all(&self.directory)?;
    let path = self.directory.join(name);
    let image = self.draw.draw_violation(&frame.image, item);
    image.save_with_format(&path, image::ImageFormat::Jpeg)?;

    debug!("保存标注图像到文件: {}", path.display());
    Ok(name.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::violation::ViolationType;
  use image::RgbImage;

  fn violation() -> Violation {
    Violation {
      violation_type: ViolationType::TripleRiding,
      confidence: 0.91,
      bbox: [0.1, 0.1, 0.6, 0.6],
      frame_index: 5,
      result_image: None,
    }
  }

  #[test]
  fn saves_jpeg_into_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("results"), Draw::with_font(None));
    let frame = Frame::new(RgbImage::new(64, 48), 5);

    let name = output
      .render_result(&frame, &violation(), "clip_frame5_det0.jpg")
      .unwrap();
    assert_eq!(name, "clip_frame5_det0.jpg");

    let saved = image::open(dir.path().join("results").join(&name)).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));
  }

  #[test]
  fn rejects_names_with_path_components() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path(), Draw::with_font(None));
    let frame = Frame::from(RgbImage::new(8, 8));

    for name in ["../escape.jpg", "a/b.jpg", ".hidden.jpg", ""] {
      assert!(matches!(
        output.render_result(&frame, &violation(), name),
        Err(SaveImageFileError::InvalidName(_))
      ));
    }
  }
}
