// 该文件是 Lukou （路口） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

#[cfg(feature = "draw_labels")]
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
#[cfg(feature = "draw_labels")]
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;

use crate::model::{BBox, Category, ClassMap, DetectItem, Identity};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const COUNTED_COLOR: [u8; 3] = [16, 200, 48]; // 绿色
const OTHER_COLOR: [u8; 3] = [128, 128, 128]; // 灰色

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(String),
}

pub struct Draw {
  #[cfg(feature = "draw_labels")]
  font: Option<FontVec>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  counted_color: [u8; 3],
  other_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      #[cfg(feature = "draw_labels")]
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      counted_color: COUNTED_COLOR,
      other_color: OTHER_COLOR,
    }
  }
}

impl Draw {
  /// 从 TTF/OTF 文件加载标签字体；未加载字体时只绘制边框与标签底色
  #[cfg(feature = "draw_labels")]
  pub fn with_font_file(mut self, path: &std::path::Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn label_for(category: Category, identity: Identity) -> String {
    match identity {
      Identity::Tracked(id) => format!("{} ID:{}", category.marker(), id),
      Identity::Derived(_) => category.marker().to_string(),
    }
  }

  /// 在图像上标注一帧的全部检测结果
  pub fn draw_detections_on_image(
    &self,
    image: &mut RgbImage,
    items: &[DetectItem],
    class_map: &ClassMap,
  ) {
    for item in items {
      let category = class_map.category(item.class_id);
      let color = match category {
        Category::Other => self.other_color,
        _ => self.counted_color,
      };
      let label = Self::label_for(category, item.identity());
      self.draw_bbox_with_label(image, &item.bbox, &label, color);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BBox, label: &str, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = bbox.x_min.clamp(0, w - 1);
    let y_min = bbox.y_min.clamp(0, h - 1);
    let x_max = bbox.x_max.clamp(0, w - 1);
    let y_max = bbox.y_max.clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    for thickness in 0..2 {
      let x_min_t = (x_min + thickness).min(w - 1);
      let y_min_t = (y_min + thickness).min(h - 1);
      let x_max_t = (x_max - thickness).max(0);
      let y_max_t = (y_max - thickness).max(0);

      for x in x_min_t..=x_max_t {
        image.put_pixel(x as u32, y_min_t as u32, Rgb(color));
        image.put_pixel(x as u32, y_max_t as u32, Rgb(color));
      }

      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t as u32, y as u32, Rgb(color));
        image.put_pixel(x_max_t as u32, y as u32, Rgb(color));
      }
    }

    #[cfg(feature = "draw_labels")]
    self.draw_label(image, x_min, y_min, label, color);
    #[cfg(not(feature = "draw_labels"))]
    let _ = label;
  }

  #[cfg(feature = "draw_labels")]
  fn draw_label(&self, image: &mut RgbImage, x_min: i32, y_min: i32, label: &str, color: [u8; 3]) {
    let w = image.width() as i32;

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签放在边框上方
    let label_x = x_min.max(0);
    let label_y = (y_min - text_height).max(0);

    let max_width = (w - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    let label_height = text_height as u32;

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
