// 该文件是 Lukou （路口） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{
  sync::{Arc, mpsc},
  time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use lukou::{
  WorkerController,
  input::ReplayDetector,
  output::{Draw, PreviewSink},
};

fn build_draw(args: &args::Args) -> Result<Draw> {
  let draw = Draw::default();
  match &args.font {
    #[cfg(feature = "draw_labels")]
    Some(path) => draw
      .with_font_file(path)
      .with_context(|| format!("无法加载字体: {}", path.display())),
    #[cfg(not(feature = "draw_labels"))]
    Some(path) => {
      warn!("未启用 draw_labels 特性，忽略字体 {}", path.display());
      Ok(draw)
    }
    None => Ok(draw),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.controller_config();

  info!("输入来源: {:?}", args.input);
  info!("小型车类别: {:?}", config.class_map.small);
  info!("大型车类别: {:?}", config.class_map.large);
  info!("等待超时: {:.2?}", config.drain_timeout);

  let preview = match &args.preview {
    Some(path) => PreviewSink::with_mirror(path),
    None => PreviewSink::new(),
  };
  let controller = WorkerController::with_output(
    Arc::new(ReplayDetector),
    config,
    build_draw(&args)?,
    preview,
  );

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })
  .context("无法设置 Ctrl-C 处理器")?;

  let poll = Duration::from_millis(args.poll_ms.max(1));
  'inputs: for input in &args.input {
    let submission = controller.accept(input)?;
    println!("{}", serde_json::to_string(&submission)?);

    while controller.is_busy() {
      if rx.recv_timeout(poll).is_ok() {
        let stopped = controller.stop();
        warn!("已中断任务 (stopped = {})", stopped);
        break 'inputs;
      }
      println!("{}", controller.store().read().to_json());
    }
  }

  let state = controller.store().read();
  println!("{}", state.to_json());

  match controller.preview().fetch() {
    Ok(preview) => info!(
      "预览帧: 第 {} 帧, {} 字节{}",
      preview.frame_index,
      preview.jpeg.len(),
      controller
        .preview()
        .mirror_path()
        .map(|path| format!(", 已写入 {}", path.display()))
        .unwrap_or_default()
    ),
    Err(err) => warn!("{}", err),
  }

  info!("处理完成! 最终状态: {:?}", state.status);
  Ok(())
}
