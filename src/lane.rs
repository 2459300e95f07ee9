// 该文件是 Lukou （路口） 项目的一部分。
// src/lane.rs - 车道划分
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

use std::fmt;

/// 中心带宽度占画面宽/高的比例
const BAND_RATIO: f64 = 0.35;

/// 路口的四个车道（北、东、南、西）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lane {
  /// 北
  Lane1,
  /// 东
  Lane2,
  /// 南
  Lane3,
  /// 西
  Lane4,
}

impl Lane {
  pub const ALL: [Lane; 4] = [Lane::Lane1, Lane::Lane2, Lane::Lane3, Lane::Lane4];

  pub fn as_str(&self) -> &'static str {
    match self {
      Lane::Lane1 => "lane1",
      Lane::Lane2 => "lane2",
      Lane::Lane3 => "lane3",
      Lane::Lane4 => "lane4",
    }
  }

  pub fn index(&self) -> usize {
    *self as usize
  }

  /// 根据目标中心点和画面尺寸划分车道。
  ///
  /// 先按中心带匹配（北、东、南、西依次优先），都不命中时退回象限划分：
  /// 右上为东，左上为北，左下为西，其余为南。对任意 `width > 0, height > 0`
  /// 总能给出唯一结果。
  pub fn classify(cx: i32, cy: i32, width: u32, height: u32) -> Lane {
    let (cx, cy) = (cx as f64, cy as f64);
    let (w, h) = (width as f64, height as f64);
    let mid_x = w / 2.0;
    let mid_y = h / 2.0;

    let in_column = (cx - mid_x).abs() <= w * BAND_RATIO;
    let in_row = (cy - mid_y).abs() <= h * BAND_RATIO;
    let top = cy < mid_y;
    let right = cx >= mid_x;

    if top && in_column {
      return Lane::Lane1;
    }
    if right && in_row {
      return Lane::Lane2;
    }
    if !top && in_column {
      return Lane::Lane3;
    }
    if !right && in_row {
      return Lane::Lane4;
    }

    // 象限兜底
    match (right, top) {
      (true, true) => Lane::Lane2,
      (false, true) => Lane::Lane1,
      (false, false) => Lane::Lane4,
      (true, false) => Lane::Lane3,
    }
  }
}

impl fmt::Display for Lane {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
