use std::{
  path::Path,
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;

use lukou::{
  ControllerConfig, PublishedState, StateStore, Status, WorkerController,
  model::{BBox, DetectItem, DetectedFrame, Detector, DetectorError, FrameSource},
  output::PreviewError,
};

/// 测试用检测器：
/// - `*.png` 产出一帧
/// - `clip-N.*` 产出 N 帧，`endless.*` 不会耗尽，`slow.*` 每帧耗时较长
/// - `missing*` 无法打开，`panic.*` 读取第一帧时 panic
struct Scripted;

fn frame(n: u64) -> DetectedFrame {
  DetectedFrame {
    image: RgbImage::new(64, 48),
    items: vec![
      DetectItem {
        class_id: 2,
        score: 0.9,
        bbox: BBox::new(28, 4, 36, 10),
        track_id: Some(n),
      },
      DetectItem {
        class_id: 7,
        score: 0.8,
        bbox: BBox::new(50, 20, 62, 28),
        track_id: None,
      },
    ],
  }
}

impl Detector for Scripted {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, DetectorError> {
    let name = path
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or_default()
      .to_string();

    if name.starts_with("missing") {
      return Err(DetectorError::Unsupported(path.to_path_buf()));
    }
    if path.extension().is_some_and(|ext| ext == "png") {
      return Ok(Box::new(std::iter::once(Ok::<_, DetectorError>(frame(1)))));
    }
    if let Some(count) = name.strip_prefix("clip-") {
      let count: u64 = count.parse().unwrap();
      return Ok(Box::new((1..=count).map(|n| Ok::<_, DetectorError>(frame(n)))));
    }
    if name == "panic" {
      return Ok(Box::new(std::iter::from_fn(
        || -> Option<Result<DetectedFrame, DetectorError>> { panic!("检测器崩溃") },
      )));
    }
    let delay = if name == "slow" {
      Duration::from_millis(400)
    } else {
      Duration::from_millis(2)
    };
    Ok(Box::new((1..).map(move |n| {
      thread::sleep(delay);
      Ok::<_, DetectorError>(frame(n))
    })))
  }
}

fn controller(drain_timeout: Duration) -> WorkerController {
  WorkerController::new(
    Arc::new(Scripted),
    ControllerConfig {
      drain_timeout,
      frame_yield: Duration::ZERO,
      ..Default::default()
    },
  )
}

fn wait_for(
  store: &StateStore,
  what: &str,
  mut pred: impl FnMut(&PublishedState) -> bool,
) -> PublishedState {
  let deadline = Instant::now() + Duration::from_secs(10);
  loop {
    let state = store.read();
    if pred(&state) {
      return state;
    }
    assert!(Instant::now() < deadline, "等待超时: {what}, 最后状态 {state:?}");
    thread::sleep(Duration::from_millis(2));
  }
}

#[test]
fn stop_without_job_has_no_side_effects() {
  let controller = controller(Duration::from_secs(2));
  let before = controller.store().read();
  assert!(!controller.stop());
  assert_eq!(controller.store().read(), before);
  assert!(!controller.is_busy());
}

#[test]
fn image_job_publishes_counts_and_preview() {
  let controller = controller(Duration::from_secs(2));
  let submission = controller.accept("/uploads/cross.png").unwrap();
  assert_eq!(submission.source_label, "cross.png");
  assert_eq!(submission.mode.as_str(), "image");

  let state = wait_for(controller.store(), "image idle", |s| s.status == Status::Idle);
  assert_eq!(state.frame_index, 1);
  assert_eq!(state.lanes.lane1, 1);
  assert_eq!(state.lanes.lane2, 1);
  assert_eq!(state.by_category.small, 1);
  assert_eq!(state.by_category.large, 1);
  assert_eq!(state.pedestrians, Default::default());
  assert_eq!(state.source_label.as_deref(), Some("cross.png"));
  assert_eq!(controller.preview().fetch().unwrap().frame_index, 1);
}

#[test]
fn unreadable_image_reports_error_without_preview() {
  let controller = controller(Duration::from_secs(2));
  controller.accept("missing.jpg").unwrap();

  wait_for(controller.store(), "image error", |s| s.status == Status::Error);
  assert!(matches!(controller.preview().fetch(), Err(PreviewError::NotFound)));
}

#[test]
fn video_job_runs_to_exhaustion() {
  let controller = controller(Duration::from_secs(2));
  let submission = controller.accept("clip-5.mp4").unwrap();
  assert_eq!(submission.mode.as_str(), "video");

  let state = wait_for(controller.store(), "video idle", |s| {
    s.status == Status::Idle && s.frame_index == 5
  });
  assert_eq!(state.source_label.as_deref(), Some("clip-5.mp4"));
  assert_eq!(controller.preview().fetch().unwrap().frame_index, 3);
}

#[test]
fn stop_cancels_running_job() {
  let controller = controller(Duration::from_secs(2));
  controller.accept("endless.mp4").unwrap();
  wait_for(controller.store(), "running", |s| {
    s.status == Status::Running && s.frame_index >= 3
  });

  assert!(controller.stop());
  assert!(!controller.is_busy());
  let stopped = controller.store().read();
  assert_eq!(stopped.status, Status::Idle);

  thread::sleep(Duration::from_millis(50));
  assert_eq!(controller.store().read().frame_index, stopped.frame_index);
  assert!(!controller.stop());
}

#[test]
fn new_upload_supersedes_running_job() {
  let controller = controller(Duration::from_secs(2));
  controller.accept("endless.mp4").unwrap();
  wait_for(controller.store(), "first running", |s| s.frame_index >= 5);

  controller.accept("clip-40.mkv").unwrap();
  let mut last = 0;
  let state = wait_for(controller.store(), "second idle", |s| {
    assert_eq!(s.source_label.as_deref(), Some("clip-40.mkv"));
    assert!(s.frame_index >= last, "frame_idx 回退: {} -> {}", last, s.frame_index);
    last = s.frame_index;
    s.status == Status::Idle && s.frame_index == 40
  });
  assert_eq!(state.frame_index, 40);
}

#[test]
fn drain_timeout_does_not_let_old_job_publish() {
  let controller = controller(Duration::from_millis(20));
  controller.accept("slow.mp4").unwrap();
  wait_for(controller.store(), "slow running", |s| s.frame_index >= 1);

  // 旧任务正卡在一帧中，等待会超时
  controller.accept("clip-3.mp4").unwrap();
  wait_for(controller.store(), "second idle", |s| {
    s.status == Status::Idle && s.frame_index == 3
  });

  // 旧任务随后醒来，它的写入必须被丢弃
  thread::sleep(Duration::from_millis(600));
  let state = controller.store().read();
  assert_eq!(state.source_label.as_deref(), Some("clip-3.mp4"));
  assert_eq!(state.frame_index, 3);
  assert_eq!(state.status, Status::Idle);
}

#[test]
fn panicking_job_publishes_error() {
  let controller = controller(Duration::from_secs(2));
  controller.accept("panic.mp4").unwrap();

  let state = wait_for(controller.store(), "panic error", |s| s.status == Status::Error);
  assert_eq!(state.source_label.as_deref(), Some("panic.mp4"));
  assert_eq!(state.frame_index, 0);

  // 崩溃的任务不影响后续任务
  controller.accept("cross.png").unwrap();
  let state = wait_for(controller.store(), "image idle", |s| s.status == Status::Idle);
  assert_eq!(state.source_label.as_deref(), Some("cross.png"));
  assert_eq!(state.frame_index, 1);
}
