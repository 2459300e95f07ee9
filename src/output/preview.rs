// 该文件是 Lukou （路口） 项目的一部分。
// src/output/preview.rs - 最新预览帧
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
  io::Cursor,
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
};

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PreviewError {
  #[error("尚无预览图")]
  NotFound,
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 已编码的预览帧（JPEG）
#[derive(Debug, Clone)]
pub struct Preview {
  pub frame_index: u64,
  pub jpeg: Arc<[u8]>,
}

/// 只保存最新一帧的预览存储，可选同步写入文件
#[derive(Default)]
pub struct PreviewSink {
  latest: Mutex<Option<Preview>>,
  mirror: Option<PathBuf>,
}

impl PreviewSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_mirror(path: impl Into<PathBuf>) -> Self {
    Self {
      latest: Mutex::new(None),
      mirror: Some(path.into()),
    }
  }

  pub fn mirror_path(&self) -> Option<&Path> {
    self.mirror.as_deref()
  }

  /// 编码并替换最新预览帧
  pub fn store(&self, image: &RgbImage, frame_index: u64) -> Result<(), PreviewError> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
    let jpeg: Arc<[u8]> = buffer.into();

    *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Preview {
      frame_index,
      jpeg: Arc::clone(&jpeg),
    });
    debug!("预览帧已更新: 第 {} 帧, {} 字节", frame_index, jpeg.len());

    if let Some(path) = &self.mirror {
      Self::write_mirror(path, &jpeg)?;
    }
    Ok(())
  }

  pub fn fetch(&self) -> Result<Preview, PreviewError> {
    self
      .latest
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .ok_or(PreviewError::NotFound)
  }

  // 先写临时文件再改名，读者不会看到写了一半的图像
  fn write_mirror(path: &Path, jpeg: &[u8]) -> Result<(), PreviewError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("jpg.part");
    std::fs::write(&tmp, jpeg)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
  }
}
