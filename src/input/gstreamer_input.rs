// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 使用 `decodebin` 解码上传的视频文件，逐帧输出 RGB 图像。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 解码常见容器（mp4/avi/mov/mkv）还需要 `gstreamer1.0-plugins-good` 与
//! `gstreamer1.0-libav`。

use std::{
  path::Path,
  time::{Duration, Instant},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::Frame;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("No frame decoded within {0:?}")]
  Timeout(Duration),
}

/// 单次拉取的等待间隔，间隔之间检查总线错误
const PULL_INTERVAL_MS: u64 = 100;
/// 连续无新帧的最长等待
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// 视频文件输入，迭代产出按解码顺序编号的帧
pub struct GStreamerVideoInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  next_index: u64,
  finished: bool,
}

impl Drop for GStreamerVideoInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

fn pipeline_description(path: &Path) -> String {
  // 路径中的引号与反斜杠需要转义
  let location = path
    .display()
    .to_string()
    .replace('\\', "\\\\")
    .replace('"', "\\\"");
  format!(
    "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
     appsink name=sink sync=false",
    location
  )
}

impl GStreamerVideoInput {
  pub fn open(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = pipeline_description(path);
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerVideoInput {
      pipeline,
      appsink,
      next_index: 0,
      finished: false,
    })
  }

  /// 取出总线上的管道错误
  fn bus_error(&self) -> Option<GStreamerInputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(GStreamerInputError::PipelineError(format!(
        "{} ({:?})",
        err.error(),
        err.debug()
      ))),
      _ => None,
    }
  }
}

impl Iterator for GStreamerVideoInput {
  type Item = Result<Frame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let started = Instant::now();
    loop {
      if let Some(sample) = self
        .appsink
        .try_pull_sample(gst::ClockTime::from_mseconds(PULL_INTERVAL_MS))
      {
        let index = self.next_index;
        self.next_index += 1;
        return Some(convert_sample(&sample).map(|image| Frame::new(image, index)));
      }

      // 解码失败时不会产生 EOS，必须先查总线
      if let Some(err) = self.bus_error() {
        self.finished = true;
        return Some(Err(err));
      }
      if self.appsink.is_eos() {
        debug!("视频读取结束, 共 {} 帧", self.next_index);
        self.finished = true;
        return None;
      }
      if started.elapsed() > FRAME_TIMEOUT {
        self.finished = true;
        return Some(Err(GStreamerInputError::Timeout(FRAME_TIMEOUT)));
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat(video_info.format()));
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  // 行宽可能按 4 字节对齐
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + width * 3]);
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or_else(|| GStreamerInputError::PipelineError("Invalid frame dimensions".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipeline_quotes_location() {
    let description = pipeline_description(Path::new("uploads/my \"clip\".mp4"));
    assert!(description.starts_with("filesrc location=\"uploads/my \\\"clip\\\".mp4\""));
    assert!(description.ends_with("appsink name=sink sync=false"));
  }

  #[test]
  fn undecodable_video_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.mp4");
    std::fs::write(&path, b"these bytes are not a video container").unwrap();

    let mut input = match GStreamerVideoInput::open(&path) {
      Ok(input) => input,
      Err(_) => return,
    };
    assert!(matches!(input.next(), Some(Err(_))));
    assert!(input.next().is_none());
  }
}
