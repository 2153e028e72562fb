// 该文件是 Guanwu （观物） 项目的一部分。
// tests/pipeline_test.rs - 管道集成测试
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use url::Url;

use guanwu::FromUrl;
use guanwu::channel::ErrorKind;
use guanwu::detector::{
  BoundingBox, Detection, Engine, EngineError, EngineOptions, SyntheticEngine,
};
use guanwu::frame::{AnalysisFrame, PlaneBuffer, RawFrame};
use guanwu::input::SyntheticInput;
use guanwu::pipeline::{Pipeline, PipelineConfig};

fn labeled(label: &str) -> Detection {
  Detection {
    label: label.to_string(),
    score: 0.9,
    bbox: BoundingBox {
      top: 0.1,
      left: 0.1,
      bottom: 0.5,
      right: 0.5,
    },
  }
}

fn grey_frame(width: u32, height: u32, timestamp_ms: u64) -> RawFrame {
  let (w, h) = (width as usize, height as usize);
  RawFrame::new(
    width,
    height,
    [
      PlaneBuffer::packed(vec![128u8; w * h], w),
      PlaneBuffer::packed(vec![128u8; w * h / 4], w / 2),
      PlaneBuffer::packed(vec![128u8; w * h / 4], w / 2),
    ],
    0,
    timestamp_ms,
  )
}

fn config(interval_ms: u64) -> PipelineConfig {
  PipelineConfig {
    model: "model.tflite".to_string(),
    options: EngineOptions::default(),
    frame_interval: Duration::from_millis(interval_ms),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn end_to_end_synthetic_detection() {
  let mut pipeline: Pipeline<SyntheticEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  let mut results = pipeline.subscribe_results();

  let url = Url::parse("synthetic:?width=16&height=16&fps=10&frames=3").unwrap();
  let input = SyntheticInput::from_url(&url).unwrap();
  for frame in input {
    pipeline.submit(frame);
  }

  tokio::time::timeout(Duration::from_secs(2), results.changed())
    .await
    .expect("等待结果超时")
    .unwrap();

  let result = results.borrow_and_update().clone().unwrap();
  assert!(!result.detections.is_empty());
  assert_eq!(result.detections[0].label, "person");
  for detection in &result.detections {
    let b = detection.bbox;
    assert!(b.top >= 0.0 && b.bottom <= 1.0 && b.left >= 0.0 && b.right <= 1.0);
  }

  control.close();
}

static COUNTING_CALLS: AtomicUsize = AtomicUsize::new(0);

struct CountingEngine;

impl Engine for CountingEngine {
  fn load(_model: &str, _options: EngineOptions) -> Result<Self, EngineError> {
    Ok(Self)
  }

  fn infer(&mut self, _frame: &AnalysisFrame) -> Result<Vec<Detection>, EngineError> {
    COUNTING_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(vec![labeled("person")])
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn throttling_and_release_accounting() {
  let mut pipeline: Pipeline<CountingEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  let released = Arc::new(AtomicUsize::new(0));
  for timestamp in [0u64, 40, 90, 150] {
    let counter = released.clone();
    let frame = grey_frame(16, 16, timestamp).with_release(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    pipeline.submit(frame);
  }

  tokio::time::sleep(Duration::from_millis(500)).await;

  // 限流只放行 t=0 与 t=150 两帧，四个原生缓冲区全部释放且各一次
  assert_eq!(COUNTING_CALLS.load(Ordering::SeqCst), 2);
  assert_eq!(released.load(Ordering::SeqCst), 4);

  control.close();
}

/// 宽度 64 的帧推理故意放慢，宽度 32 的帧立即返回
struct SlowFastEngine;

impl Engine for SlowFastEngine {
  fn load(_model: &str, _options: EngineOptions) -> Result<Self, EngineError> {
    Ok(Self)
  }

  fn infer(&mut self, frame: &AnalysisFrame) -> Result<Vec<Detection>, EngineError> {
    if frame.width() == 64 {
      std::thread::sleep(Duration::from_millis(200));
      Ok(vec![labeled("slow")])
    } else {
      Ok(vec![labeled("fast")])
    }
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn latest_result_supersedes_stale_inference() {
  let mut pipeline: Pipeline<SlowFastEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  let mut results = pipeline.subscribe_results();

  pipeline.submit(grey_frame(64, 64, 0));
  pipeline.submit(grey_frame(32, 32, 200));

  // 慢帧推理结束后早已被新帧取代，最终可见状态必须是 fast
  tokio::time::sleep(Duration::from_millis(600)).await;
  assert!(results.has_changed().unwrap());
  let result = results.borrow_and_update().clone().unwrap();
  assert_eq!(result.detections[0].label, "fast");

  control.close();
}

static GATE_OPEN: AtomicBool = AtomicBool::new(false);

/// 宽度 64 的帧在推理中停住，直到测试打开闸门；其余帧立即返回
struct GatedEngine;

impl Engine for GatedEngine {
  fn load(_model: &str, _options: EngineOptions) -> Result<Self, EngineError> {
    Ok(Self)
  }

  fn infer(&mut self, frame: &AnalysisFrame) -> Result<Vec<Detection>, EngineError> {
    if frame.width() == 64 {
      while !GATE_OPEN.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(5));
      }
      Ok(vec![labeled("early")])
    } else {
      Ok(vec![labeled("late")])
    }
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_worker_never_publishes() {
  let mut pipeline: Pipeline<GatedEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  let mut results = pipeline.subscribe_results();

  // 旧帧在推理闸门处停住，期间提交新帧后再放行：
  // 旧帧的工作者完成推理时必须观察到代号已提升，一次也不发布
  pipeline.submit(grey_frame(64, 64, 0));
  tokio::time::sleep(Duration::from_millis(100)).await;
  pipeline.submit(grey_frame(32, 32, 200));
  tokio::time::sleep(Duration::from_millis(100)).await;
  GATE_OPEN.store(true, Ordering::SeqCst);

  tokio::time::timeout(Duration::from_secs(2), results.changed())
    .await
    .expect("等待结果超时")
    .unwrap();
  let result = results.borrow_and_update().clone().unwrap();
  assert_eq!(result.detections[0].label, "late");

  // 唯一一次发布来自新帧；旧帧若发布会留下第二次变更
  tokio::time::sleep(Duration::from_millis(300)).await;
  assert!(!results.has_changed().unwrap());

  control.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_detector_fails_soft() {
  let mut pipeline: Pipeline<SyntheticEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();
  control.close();

  let mut results = pipeline.subscribe_results();
  let mut errors = pipeline.subscribe_errors();

  pipeline.submit(grey_frame(16, 16, 0));

  let event = tokio::time::timeout(Duration::from_secs(2), errors.recv())
    .await
    .expect("等待错误事件超时")
    .unwrap();
  assert_eq!(event.kind, ErrorKind::DetectorNotReady);

  // 快速失败路径仍发布空结果，管道保持运转
  tokio::time::timeout(Duration::from_secs(2), results.changed())
    .await
    .expect("等待结果超时")
    .unwrap();
  let result = results.borrow_and_update().clone().unwrap();
  assert!(result.detections.is_empty());
  assert_eq!(result.elapsed_ms, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conversion_failure_drops_only_the_offending_frame() {
  let mut pipeline: Pipeline<SyntheticEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  let mut results = pipeline.subscribe_results();
  let mut errors = pipeline.subscribe_errors();

  // 亮度平面被截断的坏帧
  let bad = RawFrame::new(
    16,
    16,
    [
      PlaneBuffer::packed(vec![128u8; 16], 16),
      PlaneBuffer::packed(vec![128u8; 64], 8),
      PlaneBuffer::packed(vec![128u8; 64], 8),
    ],
    0,
    0,
  );
  pipeline.submit(bad);

  let event = tokio::time::timeout(Duration::from_secs(2), errors.recv())
    .await
    .expect("等待错误事件超时")
    .unwrap();
  assert_eq!(event.kind, ErrorKind::Conversion);

  // 后续好帧照常产出结果
  pipeline.submit(grey_frame(16, 16, 200));
  tokio::time::timeout(Duration::from_secs(2), results.changed())
    .await
    .expect("等待结果超时")
    .unwrap();
  let result = results.borrow_and_update().clone().unwrap();
  assert_eq!(result.detections[0].label, "person");

  control.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_waits_out_inflight_detection() {
  let mut pipeline: Pipeline<SlowFastEngine> = Pipeline::new(config(100));
  let control = pipeline.control();
  control.initialize();

  // 慢帧进入推理后再关闭：close 与 detect 互斥，
  // 不会观察到半拆除的引擎
  pipeline.submit(grey_frame(64, 64, 0));
  tokio::time::sleep(Duration::from_millis(50)).await;

  let closer = control.clone();
  let handle = tokio::task::spawn_blocking(move || {
    closer.close();
  });
  handle.await.unwrap();

  assert_eq!(
    control.state(),
    guanwu::detector::DetectorState::Closed
  );
}
