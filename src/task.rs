// 该文件是 Lukou （路口） 项目的一部分。
// src/task.rs - 单次 / 持续处理任务
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
  fmt::Display,
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::FrameAggregator,
  model::{DetectedFrame, Detector, DetectorError},
  output::Render,
  state::{StateWriter, Status},
};

/// 协作式取消信号：只在两帧之间检查，不会打断正在处理的帧
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Error, Debug)]
pub enum JobError {
  #[error("输入源不可读: {0}")]
  SourceUnreadable(#[source] DetectorError),
  #[error("输入源没有可用的帧")]
  NoFrame,
  #[error("检测器错误: {0}")]
  DetectorFailure(#[source] DetectorError),
}

/// 一个任务运行所需的全部资源
pub struct JobContext {
  pub source: PathBuf,
  pub source_label: String,
  pub detector: Arc<dyn Detector>,
  pub aggregator: Arc<FrameAggregator>,
  pub writer: StateWriter,
  pub cancel: CancelToken,
}

impl JobContext {
  fn publish_frame(&self, frame: &DetectedFrame, frame_index: u64, status: Status) {
    let counts = self
      .aggregator
      .aggregate(&frame.items, frame.width(), frame.height());
    self.writer.update(|state| {
      state.frame_index = frame_index;
      state.apply_counts(&counts);
      state.source_label = Some(self.source_label.clone());
      state.status = status;
    });
  }

  fn publish_status(&self, status: Status) {
    self.writer.update(|state| {
      state.source_label = Some(self.source_label.clone());
      state.status = status;
    });
  }

  /// 写入预览；写入权已被作废的任务不再覆盖预览
  fn render_preview<O>(&self, output: &O, frame: &DetectedFrame, frame_index: u64)
  where
    O: Render,
    O::Error: Display,
  {
    if !self.writer.is_current() {
      debug!("任务已被取代，跳过第 {} 帧预览", frame_index);
      return;
    }
    if let Err(err) = output.render_result(frame, frame_index) {
      warn!("预览写入失败（第 {} 帧）: {}", frame_index, err);
    }
  }
}

pub trait Task<O>: Sized {
  type Error;
  fn run_task(self, ctx: JobContext, output: O) -> Result<(), Self::Error>;
}

/// 图片任务：只处理一帧
pub struct OneShotTask;

impl OneShotTask {
  fn process<O>(ctx: &JobContext, output: &O) -> Result<(), JobError>
  where
    O: Render,
    O::Error: Display,
  {
    let frame = {
      let mut source = ctx
        .detector
        .open_source(&ctx.source)
        .map_err(JobError::SourceUnreadable)?;
      source
        .next()
        .ok_or(JobError::NoFrame)?
        .map_err(JobError::SourceUnreadable)?
    };
    info!(
      "输入帧获取成功: {}x{}, {} 个目标",
      frame.width(),
      frame.height(),
      frame.items.len()
    );

    // 先写预览，状态变为 idle 时预览已可读取
    ctx.render_preview(output, &frame, 1);
    ctx.publish_frame(&frame, 1, Status::Idle);
    Ok(())
  }
}

impl<O> Task<O> for OneShotTask
where
  O: Render,
  O::Error: Display,
{
  type Error = JobError;

  fn run_task(self, ctx: JobContext, output: O) -> Result<(), Self::Error> {
    info!("开始单次任务: {}", ctx.source_label);
    let now = std::time::Instant::now();
    let result = Self::process(&ctx, &output);
    match &result {
      Ok(()) => info!("单次任务完成，耗时: {:.2?}", now.elapsed()),
      Err(err) => {
        error!("单次任务失败: {}", err);
        ctx.publish_status(Status::Error);
      }
    }
    result
  }
}

/// 视频任务：逐帧处理直到输入耗尽或被取消
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  preview_every: u64,
  frame_yield: Duration,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      preview_every: 3,
      frame_yield: Duration::from_millis(10),
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 每处理 N 帧写一次预览，0 表示不写
  pub fn with_preview_every(mut self, preview_every: u64) -> Self {
    self.preview_every = preview_every;
    self
  }

  pub fn with_frame_yield(mut self, frame_yield: Duration) -> Self {
    self.frame_yield = frame_yield;
    self
  }

  fn should_preview(&self, frame_index: u64) -> bool {
    self.preview_every > 0 && frame_index % self.preview_every == 0
  }
}

impl<O> Task<O> for ContinuousTask
where
  O: Render,
  O::Error: Display,
{
  type Error = JobError;

  fn run_task(self, ctx: JobContext, output: O) -> Result<(), Self::Error> {
    info!("开始持续任务: {}", ctx.source_label);

    let mut source = match ctx.detector.open_source(&ctx.source) {
      Ok(source) => source,
      Err(err) => {
        error!("无法打开输入源 {}: {}", ctx.source.display(), err);
        ctx.publish_status(Status::Error);
        return Err(JobError::SourceUnreadable(err));
      }
    };

    let mut frame_index = 0u64;
    let result = loop {
      if ctx.cancel.is_cancelled() {
        warn!("收到取消信号，退出任务循环");
        break Ok(());
      }

      let frame = match source.next() {
        None => {
          info!("输入源已耗尽");
          break Ok(());
        }
        Some(Err(err)) => break Err(JobError::DetectorFailure(err)),
        Some(Ok(frame)) => frame,
      };

      frame_index += 1;
      ctx.publish_frame(&frame, frame_index, Status::Running);
      if self.should_preview(frame_index) {
        ctx.render_preview(&output, &frame, frame_index);
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break Ok(());
      }

      if self.frame_yield.is_zero() {
        thread::yield_now();
      } else {
        thread::sleep(self.frame_yield);
      }
    };

    drop(source);

    match &result {
      Ok(()) => {
        ctx.publish_status(Status::Idle);
        info!("任务完成，共处理 {} 帧", frame_index);
      }
      Err(err) => {
        error!("任务在第 {} 帧后失败: {}", frame_index, err);
        ctx.publish_status(Status::Error);
      }
    }
    result
  }
}
