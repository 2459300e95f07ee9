// 该文件是 Lukou （路口） 项目的一部分。
// src/aggregate.rs - 单帧计数聚合
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

use std::collections::HashSet;

use serde::Serialize;

use crate::{
  lane::Lane,
  model::{Category, ClassMap, DetectItem, Identity},
};

/// 每个车道的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaneCounts {
  pub lane1: usize,
  pub lane2: usize,
  pub lane3: usize,
  pub lane4: usize,
}

impl LaneCounts {
  pub fn get(&self, lane: Lane) -> usize {
    match lane {
      Lane::Lane1 => self.lane1,
      Lane::Lane2 => self.lane2,
      Lane::Lane3 => self.lane3,
      Lane::Lane4 => self.lane4,
    }
  }

  fn from_sets(sets: &[HashSet<Identity>; 4]) -> Self {
    Self {
      lane1: sets[Lane::Lane1.index()].len(),
      lane2: sets[Lane::Lane2.index()].len(),
      lane3: sets[Lane::Lane3.index()].len(),
      lane4: sets[Lane::Lane4.index()].len(),
    }
  }
}

/// 按大小类别的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
  #[serde(rename = "Small")]
  pub small: usize,
  #[serde(rename = "Large")]
  pub large: usize,
}

/// 单帧计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounts {
  pub lanes: LaneCounts,
  pub by_category: CategoryCounts,
}

/// 单帧聚合器。
///
/// 按身份去重：同一身份在一帧内对每个车道、每个类别至多计一次，
/// 结果与检测结果的顺序无关。
#[derive(Debug, Clone, Default)]
pub struct FrameAggregator {
  class_map: ClassMap,
}

impl FrameAggregator {
  pub fn new(class_map: ClassMap) -> Self {
    Self { class_map }
  }

  pub fn aggregate(&self, items: &[DetectItem], width: u32, height: u32) -> FrameCounts {
    let mut lane_sets: [HashSet<Identity>; 4] = Default::default();
    let mut small = HashSet::new();
    let mut large = HashSet::new();

    for item in items {
      let identity = item.identity();
      match self.class_map.category(item.class_id) {
        Category::Small => small.insert(identity),
        Category::Large => large.insert(identity),
        Category::Other => continue,
      };
      let (cx, cy) = item.bbox.centroid();
      let lane = Lane::classify(cx, cy, width, height);
      lane_sets[lane.index()].insert(identity);
    }

    FrameCounts {
      lanes: LaneCounts::from_sets(&lane_sets),
      by_category: CategoryCounts {
        small: small.len(),
        large: large.len(),
      },
    }
  }
}
