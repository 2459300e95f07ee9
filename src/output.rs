// 该文件是 Lukou （路口） 项目的一部分。
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

use std::sync::Arc;

use crate::model::{ClassMap, DetectedFrame};

pub mod draw;
mod preview;

pub use self::draw::{Draw, DrawError};
pub use self::preview::{Preview, PreviewError, PreviewSink};

pub trait Render: Sized {
  type Error;
  fn render_result(&self, frame: &DetectedFrame, frame_index: u64) -> Result<(), Self::Error>;
}

/// 标注检测结果并写入预览存储
#[derive(Clone)]
pub struct PreviewOutput {
  draw: Arc<Draw>,
  class_map: ClassMap,
  sink: Arc<PreviewSink>,
}

impl PreviewOutput {
  pub fn new(draw: Arc<Draw>, class_map: ClassMap, sink: Arc<PreviewSink>) -> Self {
    Self {
      draw,
      class_map,
      sink,
    }
  }

  pub fn sink(&self) -> &Arc<PreviewSink> {
    &self.sink
  }
}

impl Render for PreviewOutput {
  type Error = PreviewError;

  fn render_result(&self, frame: &DetectedFrame, frame_index: u64) -> Result<(), Self::Error> {
    // 在副本上绘制，原始帧不受影响
    let mut image = frame.image.clone();
    self
      .draw
      .draw_detections_on_image(&mut image, &frame.items, &self.class_map);
    self.sink.store(&image, frame_index)
  }
}
