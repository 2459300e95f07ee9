// 该文件是 Lukou （路口） 项目的一部分。
// src/input/replay.rs - 回放已记录的检测结果
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

//! # 检测记录回放
//!
//! 以离线记录代替在线检测器：
//! - 图片路径：解码图片，并读取同名 `.txt` 检测记录
//! - 目录路径：按文件名顺序把目录中的每张图片当作一帧视频
//!
//! 记录文件每行一个目标：
//!
//! ```text
//! class_id, score, x_min, y_min, x_max, y_max[, track_id]
//! ```
//!
//! 坐标为 `[0, 1]` 归一化值，按帧尺寸换算到像素。空行和 `#` 开头的行被忽略，
//! 缺少记录文件等价于该帧没有目标。

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use image::{ImageFormat, ImageReader};
use tracing::{debug, info};

use crate::model::{BBox, DetectItem, DetectedFrame, Detector, DetectorError, FrameSource};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayDetector;

impl Detector for ReplayDetector {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, DetectorError> {
    let metadata = std::fs::metadata(path).map_err(|source| DetectorError::Open {
      path: path.to_path_buf(),
      source,
    })?;

    let frames = if metadata.is_dir() {
      list_frames(path)?
    } else if ImageFormat::from_path(path).is_ok() {
      vec![path.to_path_buf()]
    } else {
      return Err(DetectorError::Unsupported(path.to_path_buf()));
    };

    info!("回放输入源: {}, 共 {} 帧", path.display(), frames.len());
    Ok(Box::new(ReplaySource {
      frames: frames.into_iter(),
    }))
  }
}

struct ReplaySource {
  frames: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ReplaySource {
  type Item = Result<DetectedFrame, DetectorError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.next().map(|path| load_frame(&path))
  }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, DetectorError> {
  let open_error = |source| DetectorError::Open {
    path: dir.to_path_buf(),
    source,
  };

  let mut frames = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(open_error)? {
    let path = entry.map_err(open_error)?.path();
    if path.is_file() && ImageFormat::from_path(&path).is_ok() {
      frames.push(path);
    }
  }
  frames.sort();
  Ok(frames)
}

fn load_frame(path: &Path) -> Result<DetectedFrame, DetectorError> {
  let image = ImageReader::open(path)
    .map_err(|source| DetectorError::Open {
      path: path.to_path_buf(),
      source,
    })?
    .decode()
    .map_err(|source| DetectorError::Decode {
      path: path.to_path_buf(),
      source,
    })?
    .into_rgb8();

  let record = path.with_extension("txt");
  let items = match std::fs::read_to_string(&record) {
    Ok(text) => parse_record(&text, &record, image.width(), image.height())?,
    Err(err) if err.kind() == ErrorKind::NotFound => {
      debug!("没有检测记录: {}", record.display());
      Vec::new()
    }
    Err(source) => {
      return Err(DetectorError::Open {
        path: record,
        source,
      });
    }
  };

  Ok(DetectedFrame { image, items })
}

/// 解析一帧的检测记录
pub fn parse_record(
  text: &str,
  path: &Path,
  width: u32,
  height: u32,
) -> Result<Vec<DetectItem>, DetectorError> {
  let mut items = Vec::new();

  for (index, line) in text.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let malformed = |reason: String| DetectorError::Record {
      path: path.to_path_buf(),
      line: index + 1,
      reason,
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 && fields.len() != 7 {
      return Err(malformed(format!("期望 6 或 7 个字段, 实际 {}", fields.len())));
    }

    let class_id = fields[0]
      .parse::<u32>()
      .map_err(|e| malformed(format!("类别编号 '{}': {}", fields[0], e)))?;
    let score = fields[1]
      .parse::<f32>()
      .map_err(|e| malformed(format!("置信度 '{}': {}", fields[1], e)))?;

    let mut bbox = [0f32; 4];
    for (slot, field) in bbox.iter_mut().zip(&fields[2..6]) {
      let value = field
        .parse::<f32>()
        .map_err(|e| malformed(format!("坐标 '{}': {}", field, e)))?;
      // NaN 与无穷大也落在这里
      if !(0.0..=1.0).contains(&value) {
        return Err(malformed(format!("坐标 '{}' 不在 [0, 1] 内", field)));
      }
      *slot = value;
    }
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
      return Err(malformed(format!("边界框无效: {:?}", bbox)));
    }
    let pixels = BBox::from_normalized(bbox, width, height);
    if pixels.x_min >= pixels.x_max || pixels.y_min >= pixels.y_max {
      return Err(malformed(format!(
        "边界框在 {}x{} 帧上宽或高为零: {:?}",
        width, height, bbox
      )));
    }

    let track_id = match fields.get(6) {
      Some(field) => Some(
        field
          .parse::<u64>()
          .map_err(|e| malformed(format!("跟踪编号 '{}': {}", field, e)))?,
      ),
      None => None,
    };

    items.push(DetectItem {
      class_id,
      score,
      bbox: pixels,
      track_id,
    });
  }

  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn parses_tracked_and_untracked_lines() {
    let text = "# 记录\n2, 0.91, 0.4375, 0.25, 0.5625, 0.5, 7\n\n7, 0.5, 0, 0.5, 0.25, 0.75\n";
    let items = parse_record(text, Path::new("f.txt"), 640, 480).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 2);
    assert_eq!(items[0].bbox, BBox::new(280, 120, 360, 240));
    assert_eq!(items[0].track_id, Some(7));
    assert_eq!(items[1].bbox, BBox::new(0, 240, 160, 360));
    assert_eq!(items[1].track_id, None);
  }

  #[test]
  fn rejects_malformed_lines() {
    let err = parse_record("2, 0.9, 0.1, 0.1\n", Path::new("f.txt"), 10, 10).unwrap_err();
    assert!(matches!(err, DetectorError::Record { line: 1, .. }));

    let err = parse_record("\nx, 0.9, 0.1, 0.1, 0.2, 0.2\n", Path::new("f.txt"), 10, 10)
      .unwrap_err();
    assert!(matches!(err, DetectorError::Record { line: 2, .. }));

    let err = parse_record("2, 0.9, 0.5, 0.1, 0.2, 0.2\n", Path::new("f.txt"), 10, 10).unwrap_err();
    assert!(matches!(err, DetectorError::Record { .. }));

    for line in [
      "2, 0.9, 1e10, 0.1, 2e10, 0.2",
      "2, 0.9, -0.1, 0.1, 0.5, 0.2",
      "2, 0.9, 0.1, 0.1, 1.5, 0.2",
      "2, 0.9, NaN, 0.1, 0.5, 0.2",
      "2, 0.9, 0.1, 0.1, inf, 0.2",
      "2, 0.9, 0.1, -inf, 0.5, 0.2",
      // 640 宽时两端都截断到 64
      "2, 0.9, 0.1, 0.1, 0.1001, 0.2",
    ] {
      let err = parse_record(line, Path::new("f.txt"), 640, 480).unwrap_err();
      assert!(matches!(err, DetectorError::Record { line: 1, .. }), "{line}: {err:?}");
    }
  }

  #[test]
  fn accepts_full_frame_box() {
    let items = parse_record("7, 0.5, 0, 0, 1, 1\n", Path::new("f.txt"), 640, 480).unwrap();
    assert_eq!(items[0].bbox, BBox::new(0, 0, 640, 480));
  }

  #[test]
  fn replays_single_image_with_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("cross.png");
    RgbImage::new(640, 480).save(&image_path).unwrap();
    std::fs::write(dir.path().join("cross.txt"), "5, 0.8, 0.4375, 0.0625, 0.5625, 0.1875\n").unwrap();

    let frames: Vec<_> = ReplayDetector.open_source(&image_path).unwrap().collect();
    assert_eq!(frames.len(), 1);
    let frame = frames.into_iter().next().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (640, 480));
    assert_eq!(frame.items.len(), 1);
    assert_eq!(frame.items[0].class_id, 5);
  }

  #[test]
  fn replays_directory_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for (name, size) in [("002.png", 20u32), ("001.png", 10), ("003.png", 30)] {
      RgbImage::new(size, size).save(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("002.txt"), "3, 0.7, 0.1, 0.1, 0.2, 0.2, 11\n").unwrap();
    std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

    let frames: Vec<_> = ReplayDetector
      .open_source(dir.path())
      .unwrap()
      .map(Result::unwrap)
      .collect();
    let widths: Vec<_> = frames.iter().map(DetectedFrame::width).collect();
    assert_eq!(widths, [10, 20, 30]);
    assert!(frames[0].items.is_empty());
    assert_eq!(frames[1].items[0].track_id, Some(11));
  }

  #[test]
  fn missing_or_unsupported_paths_fail_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ReplayDetector.open_source(&dir.path().join("missing.png")),
      Err(DetectorError::Open { .. })
    ));

    let clip = dir.path().join("clip.mp4");
    std::fs::write(&clip, b"not a video").unwrap();
    assert!(matches!(
      ReplayDetector.open_source(&clip),
      Err(DetectorError::Unsupported(_))
    ));
  }

  #[test]
  fn corrupt_frame_fails_mid_stream() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("001.png")).unwrap();
    std::fs::write(dir.path().join("002.png"), b"garbage").unwrap();

    let mut source = ReplayDetector.open_source(dir.path()).unwrap();
    assert!(source.next().unwrap().is_ok());
    assert!(matches!(source.next(), Some(Err(DetectorError::Decode { .. }))));
    assert!(source.next().is_none());
  }
}
