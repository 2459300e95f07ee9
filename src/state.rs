// 该文件是 Lukou （路口） 项目的一部分。
// src/state.rs - 对外发布的计数状态
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

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::aggregate::{CategoryCounts, FrameCounts, LaneCounts};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  #[default]
  Idle,
  Processing,
  Starting,
  Running,
  Error,
}

/// 对外发布的完整状态记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishedState {
  /// 最近一次更新的 Unix 时间戳（秒）
  pub timestamp: i64,
  #[serde(rename = "frame_idx")]
  pub frame_index: u64,
  pub lanes: LaneCounts,
  /// 行人计数，保留字段，恒为零
  #[serde(rename = "peds")]
  pub pedestrians: LaneCounts,
  #[serde(rename = "by_type")]
  pub by_category: CategoryCounts,
  #[serde(rename = "source")]
  pub source_label: Option<String>,
  pub status: Status,
}

impl PublishedState {
  pub fn apply_counts(&mut self, counts: &FrameCounts) {
    self.lanes = counts.lanes;
    self.by_category = counts.by_category;
    self.pedestrians = LaneCounts::default();
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::json!(self)
  }
}

struct Slot {
  generation: u64,
  state: PublishedState,
}

/// 全局唯一的状态记录。
///
/// 写入总是整体替换，读取总是返回副本。写入权由 [`StateWriter`] 的代数控制：
/// 每次 [`StateStore::open_writer`] 都会作废之前的写入者。
pub struct StateStore {
  slot: Mutex<Slot>,
}

impl Default for StateStore {
  fn default() -> Self {
    Self::new()
  }
}

impl StateStore {
  pub fn new() -> Self {
    Self {
      slot: Mutex::new(Slot {
        generation: 0,
        state: PublishedState::default(),
      }),
    }
  }

  // 记录总是被整体替换，锁中毒时数据依然完整
  fn lock(&self) -> MutexGuard<'_, Slot> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn read(&self) -> PublishedState {
    self.lock().state.clone()
  }

  /// 作废现有写入者并发放新的写入者
  pub fn open_writer(self: &Arc<Self>) -> StateWriter {
    let mut slot = self.lock();
    slot.generation += 1;
    StateWriter {
      store: Arc::clone(self),
      generation: slot.generation,
    }
  }

  /// 作废现有写入者并直接写入状态
  pub fn force_status(&self, status: Status) {
    let mut slot = self.lock();
    slot.generation += 1;
    let mut next = slot.state.clone();
    next.status = status;
    next.timestamp = chrono::Utc::now().timestamp();
    slot.state = next;
  }

  fn replace_if_current(
    &self,
    generation: u64,
    f: impl FnOnce(&PublishedState) -> PublishedState,
  ) -> bool {
    let mut slot = self.lock();
    if slot.generation != generation {
      debug!(
        "丢弃过期写入: 写入者代数 {}, 当前代数 {}",
        generation, slot.generation
      );
      return false;
    }
    let mut next = f(&slot.state);
    next.timestamp = chrono::Utc::now().timestamp();
    slot.state = next;
    true
  }
}

/// 单个任务持有的写入权
#[derive(Clone)]
pub struct StateWriter {
  store: Arc<StateStore>,
  generation: u64,
}

impl StateWriter {
  /// 整体替换记录；写入者已被作废时返回 `false`
  pub fn publish(&self, state: PublishedState) -> bool {
    self.store.replace_if_current(self.generation, move |_| state)
  }

  /// 在当前记录的副本上修改后整体替换
  pub fn update(&self, f: impl FnOnce(&mut PublishedState)) -> bool {
    self.store.replace_if_current(self.generation, |current| {
      let mut next = current.clone();
      f(&mut next);
      next
    })
  }

  pub fn is_current(&self) -> bool {
    self.store.lock().generation == self.generation
  }
}
