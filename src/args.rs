// 该文件是 Lukou （路口） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use lukou::{ControllerConfig, model::ClassMap};

/// Lukou 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（带检测记录的图片文件，或按帧存放的图片目录）
  /// 支持格式:
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.webp
  /// - 其他路径一律按视频处理
  #[arg(long, value_name = "SOURCE", num_args = 1.., required = true)]
  pub input: Vec<PathBuf>,

  /// 预览图同步写入的文件路径
  #[arg(long, value_name = "FILE")]
  pub preview: Option<PathBuf>,

  /// 标签字体文件（TTF/OTF）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 计为小型车的类别编号
  #[arg(long, value_delimiter = ',', default_value = "2,3", value_name = "IDS")]
  pub small_classes: Vec<u32>,

  /// 计为大型车的类别编号
  #[arg(long, value_delimiter = ',', default_value = "5,7", value_name = "IDS")]
  pub large_classes: Vec<u32>,

  /// 等待上一个任务退出的最长时间（毫秒）
  #[arg(long, default_value = "2000", value_name = "MS")]
  pub drain_timeout_ms: u64,

  /// 视频每处理 N 帧写一次预览（0 表示不写）
  #[arg(long, default_value = "3", value_name = "N")]
  pub preview_every: u64,

  /// 视频每帧之后的让出时间（毫秒）
  #[arg(long, default_value = "10", value_name = "MS")]
  pub frame_yield_ms: u64,

  /// 最大处理帧数（仅对视频有效，0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,

  /// 输出状态的间隔（毫秒）
  #[arg(long, default_value = "500", value_name = "MS")]
  pub poll_ms: u64,
}

impl Args {
  pub fn controller_config(&self) -> ControllerConfig {
    ControllerConfig {
      drain_timeout: Duration::from_millis(self.drain_timeout_ms),
      preview_every: self.preview_every,
      frame_yield: Duration::from_millis(self.frame_yield_ms),
      frame_number: (self.max_frames > 0).then_some(self.max_frames),
      class_map: ClassMap {
        small: self.small_classes.clone(),
        large: self.large_classes.clone(),
      },
    }
  }
}
