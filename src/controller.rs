// 该文件是 Lukou （路口） 项目的一部分。
// src/controller.rs - 后台任务控制
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

//! # 任务控制器
//!
//! 控制器持有唯一的任务槽位。接受新输入时先请求上一个任务取消，并在限定时间内
//! 等待其结束；超时后不再等待，直接启动新任务。每个任务都持有独立的写入权，
//! 新任务启动（或 [`WorkerController::stop`]）时旧任务的写入权即被作废，
//! 即使旧任务尚未退出，它的结果也不会再出现在发布状态中。

use std::{
  path::Path,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    mpsc::{self, Receiver, RecvTimeoutError},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::FrameAggregator,
  input::{MediaKind, source_label},
  model::{ClassMap, Detector},
  output::{Draw, PreviewOutput, PreviewSink},
  state::{PublishedState, StateStore, StateWriter, Status},
  task::{CancelToken, ContinuousTask, JobContext, OneShotTask, Task},
};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
  /// 等待上一个任务退出的最长时间
  pub drain_timeout: Duration,
  /// 视频任务每 N 帧写一次预览
  pub preview_every: u64,
  /// 视频任务每帧之后的让出时间
  pub frame_yield: Duration,
  /// 视频任务最多处理的帧数
  pub frame_number: Option<u64>,
  pub class_map: ClassMap,
}

impl Default for ControllerConfig {
  fn default() -> Self {
    Self {
      drain_timeout: Duration::from_secs(2),
      preview_every: 3,
      frame_yield: Duration::from_millis(10),
      frame_number: None,
      class_map: ClassMap::default(),
    }
  }
}

/// 接受任务后的回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
  #[serde(rename = "filename")]
  pub source_label: String,
  pub mode: MediaKind,
}

#[derive(Error, Debug)]
pub enum ControllerError {
  #[error("无法启动任务线程: {0}")]
  Spawn(#[from] std::io::Error),
}

struct JobHandle {
  label: String,
  cancel: CancelToken,
  // 任务线程退出时发送端被丢弃
  done: Receiver<()>,
  thread: JoinHandle<()>,
}

impl JobHandle {
  fn is_alive(&self) -> bool {
    !self.thread.is_finished()
  }

  /// 请求取消并等待退出，返回是否在超时前退出
  fn cancel_and_drain(self, timeout: Duration) -> bool {
    info!("请求停止任务: {}", self.label);
    self.cancel.cancel();
    match self.done.recv_timeout(timeout) {
      Ok(()) | Err(RecvTimeoutError::Disconnected) => {
        if self.thread.join().is_err() {
          error!("任务线程异常退出: {}", self.label);
        }
        debug!("任务已停止: {}", self.label);
        true
      }
      Err(RecvTimeoutError::Timeout) => {
        warn!(
          "任务 {} 未在 {:.2?} 内退出，不再等待（其写入权已作废）",
          self.label, timeout
        );
        false
      }
    }
  }
}

/// 任务线程 panic 时把状态置为 error
struct ErrorOnPanic(StateWriter);

impl Drop for ErrorOnPanic {
  fn drop(&mut self) {
    if thread::panicking() {
      self.0.update(|state| state.status = Status::Error);
    }
  }
}

pub struct WorkerController {
  detector: Arc<dyn Detector>,
  aggregator: Arc<FrameAggregator>,
  store: Arc<StateStore>,
  output: PreviewOutput,
  config: ControllerConfig,
  slot: Mutex<Option<JobHandle>>,
}

impl WorkerController {
  pub fn new(detector: Arc<dyn Detector>, config: ControllerConfig) -> Self {
    Self::with_output(detector, config, Draw::default(), PreviewSink::new())
  }

  pub fn with_output(
    detector: Arc<dyn Detector>,
    config: ControllerConfig,
    draw: Draw,
    preview: PreviewSink,
  ) -> Self {
    let output = PreviewOutput::new(
      Arc::new(draw),
      config.class_map.clone(),
      Arc::new(preview),
    );
    Self {
      detector,
      aggregator: Arc::new(FrameAggregator::new(config.class_map.clone())),
      store: Arc::new(StateStore::new()),
      output,
      config,
      slot: Mutex::new(None),
    }
  }

  pub fn store(&self) -> &Arc<StateStore> {
    &self.store
  }

  pub fn preview(&self) -> &Arc<PreviewSink> {
    self.output.sink()
  }

  fn lock_slot(&self) -> MutexGuard<'_, Option<JobHandle>> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 是否有任务正在运行
  pub fn is_busy(&self) -> bool {
    self.lock_slot().as_ref().is_some_and(JobHandle::is_alive)
  }

  /// 接受新的输入并在后台启动任务，先停止正在运行的任务
  pub fn accept(&self, path: impl AsRef<Path>) -> Result<Submission, ControllerError> {
    let path = path.as_ref();
    let mode = MediaKind::from_path(path);
    let label = source_label(path);

    let mut slot = self.lock_slot();
    if let Some(job) = slot.take()
      && job.is_alive()
    {
      job.cancel_and_drain(self.config.drain_timeout);
    }

    // 新任务从空白记录开始
    let writer = self.store.open_writer();
    writer.publish(PublishedState {
      status: match mode {
        MediaKind::Image => Status::Processing,
        MediaKind::Video => Status::Starting,
      },
      source_label: Some(label.clone()),
      ..Default::default()
    });

    let cancel = CancelToken::new();
    let ctx = JobContext {
      source: path.to_path_buf(),
      source_label: label.clone(),
      detector: Arc::clone(&self.detector),
      aggregator: Arc::clone(&self.aggregator),
      writer: writer.clone(),
      cancel: cancel.clone(),
    };
    let output = self.output.clone();
    let continuous = ContinuousTask::default()
      .with_frame_number(self.config.frame_number)
      .with_preview_every(self.config.preview_every)
      .with_frame_yield(self.config.frame_yield);

    let (done_tx, done_rx) = mpsc::channel::<()>();
    let spawned = thread::Builder::new()
      .name(format!("lukou-{}", mode))
      .spawn(move || {
        let _done = done_tx;
        let _guard = ErrorOnPanic(writer);
        let result = match mode {
          MediaKind::Image => OneShotTask.run_task(ctx, output),
          MediaKind::Video => continuous.run_task(ctx, output),
        };
        if let Err(err) = result {
          debug!("任务结束于错误: {}", err);
        }
      });

    let thread = match spawned {
      Ok(thread) => thread,
      Err(err) => {
        error!("无法启动任务线程: {}", err);
        self.store.force_status(Status::Error);
        return Err(err.into());
      }
    };

    *slot = Some(JobHandle {
      label: label.clone(),
      cancel,
      done: done_rx,
      thread,
    });
    info!("已接受任务: {} ({})", label, mode);

    Ok(Submission {
      source_label: label,
      mode,
    })
  }

  /// 停止正在运行的任务并将状态置为 idle；没有运行中的任务时不做任何事
  pub fn stop(&self) -> bool {
    let mut slot = self.lock_slot();
    match slot.take() {
      Some(job) if job.is_alive() => {
        job.cancel_and_drain(self.config.drain_timeout);
        self.store.force_status(Status::Idle);
        true
      }
      other => {
        *slot = other;
        false
      }
    }
  }
}

impl Drop for WorkerController {
  fn drop(&mut self) {
    if let Some(job) = self.lock_slot().take() {
      job.cancel.cancel();
    }
  }
}
