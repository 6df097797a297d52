// 该文件是 Weizhang （违章识别） 项目的一部分。
// src/output/draw.rs - 违章结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;
use tracing::{debug, info};

use crate::violation::Violation;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

/// 未指定字体时依次尝试的系统字体
pub const DEFAULT_FONT_PATHS: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 标注绘制器
///
/// 没有可用字体时只画边框与标签底色，不写文字。
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    let font = DEFAULT_FONT_PATHS
      .iter()
      .map(Path::new)
      .filter(|path| path.is_file())
      .find_map(|path| load_font(path).ok());
    if font.is_none() {
      info!("未找到系统字体, 标注图将不包含文字");
    }
    Self::with_font(font)
  }
}

fn load_font(path: &Path) -> Result<FontArc, DrawError> {
  let data = std::fs::read(path)?;
  let font = FontArc::try_from_vec(data)?;
  debug!("加载字体: {}", path.display());
  Ok(font)
}

impl Draw {
  pub fn with_font(font: Option<FontArc>) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font,
    }
  }

  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    Ok(Self::with_font(Some(load_font(path)?)))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 标签文本，例如 `No Helmet: 0.87`
  pub fn label(violation: &Violation) -> String {
    format!(
      "{}: {:.2}",
      violation.violation_type.title(),
      violation.confidence
    )
  }

  /// 在图像副本上绘制一条违章的边框与标签
  pub fn draw_violation(&self, image: &RgbImage, violation: &Violation) -> RgbImage {
    let mut image = image.clone();
    if image.width() == 0 || image.height() == 0 {
      return image;
    }
    let color = violation.violation_type.color();
    self.draw_bbox_with_label(&mut image, &violation.bbox, &Self::label(violation), color);
    image
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str, color: [u8; 3]) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for thickness in 0..BOX_THICKNESS {
      let x_min_t = (x_min + thickness).min(x_max);
      let y_min_t = (y_min + thickness).min(y_max);
      let x_max_t = (x_max - thickness).max(x_min_t);
      let y_max_t = (y_max - thickness).max(y_min_t);

      for x in x_min_t..=x_max_t {
        image.put_pixel(x as u32, y_min_t as u32, Rgb(color));
        image.put_pixel(x as u32, y_max_t as u32, Rgb(color));
      }
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t as u32, y as u32, Rgb(color));
        image.put_pixel(x_max_t as u32, y as u32, Rgb(color));
      }
    }

    // 标签背景放在边框上方，空间不够时贴着图像顶部
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w as i32 - label_x).max(0) as u32;
    let label_height = (self.label_text_height.min(h as i32)) as u32;

    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, Rgb(color));

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }
}
