// 该文件是 Lukou （路口） 项目的一部分。
// src/model.rs - 检测结果与检测器接口
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

use std::{
  hash::{DefaultHasher, Hash, Hasher},
  path::{Path, PathBuf},
};

use image::RgbImage;
use thiserror::Error;

/// 目标大小类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
  Small,
  Large,
  /// 不参与计数，仅用于预览标注
  Other,
}

impl Category {
  pub fn marker(&self) -> &'static str {
    match self {
      Category::Small => "S",
      Category::Large => "L",
      Category::Other => "?",
    }
  }
}

/// 检测器类别编号到大小类别的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
  pub small: Vec<u32>,
  pub large: Vec<u32>,
}

impl Default for ClassMap {
  fn default() -> Self {
    // COCO: car, motorcycle / bus, truck
    Self {
      small: vec![2, 3],
      large: vec![5, 7],
    }
  }
}

impl ClassMap {
  pub fn category(&self, class_id: u32) -> Category {
    if self.small.contains(&class_id) {
      Category::Small
    } else if self.large.contains(&class_id) {
      Category::Large
    } else {
      Category::Other
    }
  }
}

/// 像素坐标边界框 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl BBox {
  pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  /// 由归一化坐标换算到像素坐标（截断取整）
  pub fn from_normalized(bbox: [f32; 4], width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self {
      x_min: (bbox[0] * w) as i32,
      y_min: (bbox[1] * h) as i32,
      x_max: (bbox[2] * w) as i32,
      y_max: (bbox[3] * h) as i32,
    }
  }

  /// 中心点（向下取整）
  pub fn centroid(&self) -> (i32, i32) {
    // 两个 i32 的均值必然落在 i32 范围内
    let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
    (mid(self.x_min, self.x_max), mid(self.y_min, self.y_max))
  }
}

/// 目标身份：跟踪器给出的编号，或由边界框坐标推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
  Tracked(u64),
  Derived(u64),
}

impl Identity {
  pub fn derived_from(bbox: &BBox) -> Self {
    let mut hasher = DefaultHasher::new();
    bbox.hash(&mut hasher);
    Identity::Derived(hasher.finish())
  }
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BBox,
  pub track_id: Option<u64>,
}

impl DetectItem {
  pub fn identity(&self) -> Identity {
    match self.track_id {
      Some(id) => Identity::Tracked(id),
      None => Identity::derived_from(&self.bbox),
    }
  }
}

/// 检测器输出的一帧：解码后的图像及其检测结果
#[derive(Debug, Clone)]
pub struct DetectedFrame {
  pub image: RgbImage,
  pub items: Vec<DetectItem>,
}

impl DetectedFrame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("无法打开输入源 {}: {source}", .path.display())]
  Open {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("图像解码错误 {}: {source}", .path.display())]
  Decode {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("检测记录格式错误 {}:{line}: {reason}", .path.display())]
  Record {
    path: PathBuf,
    line: usize,
    reason: String,
  },
  #[error("不支持的输入源: {}", .0.display())]
  Unsupported(PathBuf),
  #[error("推理错误: {0}")]
  Inference(String),
}

/// 逐帧产出检测结果的输入源；丢弃即释放资源
pub trait FrameSource: Iterator<Item = Result<DetectedFrame, DetectorError>> + Send {}

impl<T: Iterator<Item = Result<DetectedFrame, DetectorError>> + Send> FrameSource for T {}

/// 检测器（含可选的跟踪）
pub trait Detector: Send + Sync {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, DetectorError>;
}
