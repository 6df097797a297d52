// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

/// 解码后的一帧 RGB 图像
#[derive(Debug, Clone)]
pub struct Frame {
  pub image: RgbImage,
  /// 帧序号，图片恒为 0
  pub index: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self { image, index }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self::new(image, 0)
  }
}
