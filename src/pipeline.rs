// 该文件是 Guanwu （观物） 项目的一部分。
// src/pipeline.rs - 帧分析管道编排
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
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::channel::{ErrorEvent, ErrorKind, ErrorSender, ResultChannel};
use crate::convert::FrameConverter;
use crate::detector::{Detector, DetectorState, Engine, EngineOptions, InferenceResult};
use crate::frame::RawFrame;
use crate::throttle::{DEFAULT_FRAME_INTERVAL, FrameThrottler};

/// 管道配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 模型标识
  pub model: String,
  /// 推理引擎配置
  pub options: EngineOptions,
  /// 帧限流间隔
  pub frame_interval: Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      model: "model.tflite".to_string(),
      options: EngineOptions::default(),
      frame_interval: DEFAULT_FRAME_INTERVAL,
    }
  }
}

struct Shared<E> {
  detector: Mutex<Detector<E>>,
  channel: ResultChannel,
  // 最新一帧的代号；落后于它的结果被丢弃（最新者胜）
  generation: AtomicU64,
}

/// 面向生命周期上下文的检测器控制句柄。
///
/// `initialize` / `close` 与工作线程池上的 `detect` 共用同一把锁，
/// 因此关闭要么观察到推理完成，要么让推理观察到完整的关闭状态，
/// 不存在半拆除的引擎。
pub struct DetectorControl<E> {
  shared: Arc<Shared<E>>,
  config: PipelineConfig,
}

impl<E: Engine> DetectorControl<E> {
  /// 按管道配置加载模型
  pub fn initialize(&self) {
    self
      .shared
      .detector
      .lock()
      .initialize(&self.config.model, self.config.options);
  }

  /// 释放引擎资源。幂等。
  pub fn close(&self) {
    self.shared.detector.lock().close();
  }

  pub fn state(&self) -> DetectorState {
    self.shared.detector.lock().state()
  }
}

impl<E> Clone for DetectorControl<E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
      config: self.config.clone(),
    }
  }
}

/// 帧分析管道：帧源 → 限流 → 转换 → 检测 → 结果通道。
///
/// `submit` 由单一帧交付线程顺序调用；转换与推理被派发到
/// 工作线程池，使生产端吞吐与推理延迟解耦。结果按"最新者胜"
/// 原则发布：被更新帧取代的在途结果只被丢弃，不中断推理本身。
pub struct Pipeline<E> {
  throttler: FrameThrottler,
  converter: FrameConverter,
  shared: Arc<Shared<E>>,
  config: PipelineConfig,
  runtime: Handle,
}

impl<E: Engine> Pipeline<E> {
  /// 创建管道。须在 tokio 运行时上下文内调用。
  pub fn new(config: PipelineConfig) -> Self {
    let channel = ResultChannel::new();
    let detector = Mutex::new(Detector::new(channel.error_sender()));
    Self {
      throttler: FrameThrottler::new(config.frame_interval),
      converter: FrameConverter::default(),
      shared: Arc::new(Shared {
        detector,
        channel,
        generation: AtomicU64::new(0),
      }),
      config,
      runtime: Handle::current(),
    }
  }

  /// 生命周期侧的控制句柄，可跨线程克隆持有
  pub fn control(&self) -> DetectorControl<E> {
    DetectorControl {
      shared: Arc::clone(&self.shared),
      config: self.config.clone(),
    }
  }

  /// 提交一个原始帧。
  ///
  /// 限流拒绝的帧立即丢弃（释放回调随 Drop 执行）；放行的帧
  /// 移交工作线程池转换并推理。任何内部失败都化为错误流上的
  /// 事件，管道继续接收后续帧。
  pub fn submit(&mut self, frame: RawFrame) {
    if !self.throttler.admit(frame.timestamp_ms) {
      debug!("帧 {} 被限流丢弃", frame.timestamp_ms);
      return;
    }

    let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let shared = Arc::clone(&self.shared);
    let converter = self.converter.clone();

    self.runtime.spawn_blocking(move || {
      let timestamp_ms = frame.timestamp_ms;
      let analysis = match converter.convert(frame) {
        Ok(analysis) => analysis,
        Err(err) => {
          shared
            .channel
            .error_sender()
            .report(ErrorKind::Conversion, format!("帧转换失败: {}", err));
          return;
        }
      };

      // 代号判定与发布同在检测器锁内：发布按锁的先后串行，
      // 晚到锁的工作者必然观察到已提升的代号，旧结果无法覆盖新结果
      let mut detector = shared.detector.lock();
      let result = detector.detect(&analysis);

      let latest = shared.generation.load(Ordering::SeqCst);
      if latest == generation {
        shared.channel.publish(result);
      } else {
        debug!(
          "帧 {} 的结果已被取代 (代 {} < {}), 丢弃",
          timestamp_ms, generation, latest
        );
      }
    });
  }

  /// 订阅最新检测结果（仅保留最新值）
  pub fn subscribe_results(&self) -> watch::Receiver<Option<InferenceResult>> {
    self.shared.channel.subscribe_results()
  }

  /// 订阅错误事件（容量 1，丢弃最旧，无历史回放）
  pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
    self.shared.channel.subscribe_errors()
  }

  pub fn error_sender(&self) -> ErrorSender {
    self.shared.channel.error_sender()
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }
}
