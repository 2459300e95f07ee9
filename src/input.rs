// 该文件是 Lukou （路口） 项目的一部分。
// src/input.rs - 媒体输入
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

use std::{fmt, path::Path};

use serde::Serialize;

mod replay;

pub use self::replay::{ReplayDetector, parse_record};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 输入媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
  /// 图片，单次处理
  Image,
  /// 视频，持续处理
  Video,
}

impl MediaKind {
  /// 按扩展名判断：常见图片格式为图片，其余一律视为视频
  pub fn from_path(path: &Path) -> Self {
    let is_image = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| {
        let lower = ext.to_lowercase();
        IMAGE_EXTENSIONS.contains(&lower.as_str())
      })
      .unwrap_or(false);

    if is_image {
      MediaKind::Image
    } else {
      MediaKind::Video
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      MediaKind::Image => "image",
      MediaKind::Video => "video",
    }
  }
}

impl fmt::Display for MediaKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 对外展示的输入名称（文件名）
pub fn source_label(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
