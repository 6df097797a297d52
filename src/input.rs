// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::frame::Frame;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInputError, GStreamerVideoInput};

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
  Image,
  Video,
}

impl MediaKind {
  /// 按扩展名（不区分大小写）判断媒体类型
  pub fn from_extension(ext: &str) -> Option<Self> {
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Video)
    } else {
      None
    }
  }

  pub fn from_path(path: &Path) -> Option<Self> {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .and_then(Self::from_extension)
  }
}

/// 视频抽帧策略: 最多读取 `max_frames` 帧，每 `stride` 帧送检一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampling {
  pub stride: u64,
  pub max_frames: u64,
}

impl Default for FrameSampling {
  fn default() -> Self {
    Self {
      stride: 5,
      max_frames: 30,
    }
  }
}

impl FrameSampling {
  pub fn keeps(&self, index: u64) -> bool {
    index % self.stride.max(1) == 0
  }
}

/// 按 [`FrameSampling`] 过滤帧，并为帧重新编号
pub struct Sampled<I> {
  inner: I,
  sampling: FrameSampling,
  read: u64,
}

impl<I> Sampled<I> {
  pub fn new(inner: I, sampling: FrameSampling) -> Self {
    Self {
      inner,
      sampling,
      read: 0,
    }
  }
}

impl<I, E> Iterator for Sampled<I>
where
  I: Iterator<Item = Result<Frame, E>>,
{
  type Item = Result<Frame, E>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if self.read >= self.sampling.max_frames {
        return None;
      }
      let index = self.read;
      let frame = match self.inner.next()? {
        Ok(frame) => frame,
        Err(e) => return Some(Err(e)),
      };
      self.read += 1;
      if self.sampling.keeps(index) {
        return Some(Ok(Frame::new(frame.image, index)));
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("Unsupported media type: {0}")]
  UnsupportedMedia(String),
  #[error("Video decoding is not enabled in this build (feature `gstreamer_input`)")]
  VideoDisabled,
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerVideo(Sampled<GStreamerVideoInput>),
}

impl InputWrapper {
  /// 按扩展名打开上传的文件
  pub fn open(path: &Path, sampling: FrameSampling) -> Result<Self, InputError> {
    match MediaKind::from_path(path) {
      Some(MediaKind::Image) => Ok(InputWrapper::ReadImageFile(ImageFileInput::open(path)?)),
      #[cfg(feature = "gstreamer_input")]
      Some(MediaKind::Video) => {
        let input = GStreamerVideoInput::open(path)?;
        Ok(InputWrapper::GStreamerVideo(Sampled::new(input, sampling)))
      }
      #[cfg(not(feature = "gstreamer_input"))]
      Some(MediaKind::Video) => {
        let _ = sampling;
        Err(InputError::VideoDisabled)
      }
      None => Err(InputError::UnsupportedMedia(path.display().to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next().map(Ok),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerVideo(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}
