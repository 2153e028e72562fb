// 该文件是 Guanwu （观物） 项目的一部分。
// src/detector.rs - 目标检测器状态机
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

use std::time::Instant;

use tracing::{debug, info};

use crate::channel::{ErrorKind, ErrorSender};
use crate::frame::AnalysisFrame;

mod engine;
pub use self::engine::{Engine, EngineError, EngineOptions, SyntheticEngine};

/// 归一化边界框：四个坐标均为相对于分析帧的 [0, 1] 比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub top: f32,
  pub left: f32,
  pub bottom: f32,
  pub right: f32,
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 类别标签
  pub label: String,
  /// 置信度（0 - 1）
  pub score: f32,
  /// 归一化边界框
  pub bbox: BoundingBox,
}

/// 一次推理的完整结果：按引擎产出顺序排列的检测目标加耗时
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceResult {
  pub detections: Vec<Detection>,
  /// 推理耗时（毫秒）
  pub elapsed_ms: u64,
}

/// 检测器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
  Uninitialized,
  Ready,
  Closed,
}

enum EngineSlot<E> {
  Uninitialized,
  Ready(E),
  Closed,
}

/// 持有推理引擎的检测器。
///
/// 状态机：Uninitialized 经成功初始化进入 Ready；任何状态经 close
/// 进入 Closed；Closed 为终态。所有失败都转化为错误流上的事件，
/// 绝不跨管道边界抛出。调用方负责互斥：`detect` 来自工作线程池，
/// `initialize` / `close` 来自生命周期上下文，两侧共用同一把锁。
pub struct Detector<E> {
  slot: EngineSlot<E>,
  errors: ErrorSender,
}

impl<E: Engine> Detector<E> {
  pub fn new(errors: ErrorSender) -> Self {
    Self {
      slot: EngineSlot::Uninitialized,
      errors,
    }
  }

  pub fn state(&self) -> DetectorState {
    match self.slot {
      EngineSlot::Uninitialized => DetectorState::Uninitialized,
      EngineSlot::Ready(_) => DetectorState::Ready,
      EngineSlot::Closed => DetectorState::Closed,
    }
  }

  /// 加载模型并进入 Ready 状态。
  ///
  /// 失败时状态不变，并通过错误流上报一次 ModelLoad 事件；
  /// 不会自动重试，恢复需要显式再次调用。Ready 状态下再次初始化
  /// 会替换现有引擎。Closed 为终态，初始化请求被拒绝。
  pub fn initialize(&mut self, model: &str, options: EngineOptions) {
    if matches!(self.slot, EngineSlot::Closed) {
      self.errors.report(
        ErrorKind::DetectorNotReady,
        "检测器已关闭，无法再次初始化。",
      );
      return;
    }

    if !(0.0..=1.0).contains(&options.score_threshold) || options.max_results == 0 {
      self.errors.report(
        ErrorKind::ModelLoad,
        format!(
          "检测器配置无效: 置信度阈值 {} / 最大结果数 {}",
          options.score_threshold, options.max_results
        ),
      );
      return;
    }

    match E::load(model, options) {
      Ok(engine) => {
        info!("模型 {} 加载完成，检测器就绪", model);
        self.slot = EngineSlot::Ready(engine);
      }
      Err(err) => {
        self.errors.report(
          ErrorKind::ModelLoad,
          format!("模型初始化失败，请确认 {} 可用。{}", model, err),
        );
      }
    }
  }

  /// 对分析帧运行一次推理。
  ///
  /// 检测器未就绪时返回空结果（零检测、零耗时）并上报一次
  /// DetectorNotReady 事件；引擎运行失败同样返回空结果并上报
  /// InferenceRuntime。管道在任一失败后继续处理后续帧。
  /// 检测目标保持引擎产出顺序，阈值过滤与数量截断由引擎完成。
  pub fn detect(&mut self, frame: &AnalysisFrame) -> InferenceResult {
    let engine = match &mut self.slot {
      EngineSlot::Ready(engine) => engine,
      _ => {
        self.errors.report(
          ErrorKind::DetectorNotReady,
          "检测器未初始化，请先完成模型加载。",
        );
        return InferenceResult::default();
      }
    };

    if frame.is_empty() {
      self
        .errors
        .report(ErrorKind::InvalidInput, "输入帧为空，不是有效的分析帧。");
      return InferenceResult::default();
    }

    let start = Instant::now();
    match engine.infer(frame) {
      Ok(detections) => {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!("推理完成: {} 个目标, 耗时 {} ms", detections.len(), elapsed_ms);
        InferenceResult {
          detections,
          elapsed_ms,
        }
      }
      Err(err) => {
        self
          .errors
          .report(ErrorKind::InferenceRuntime, format!("推理引擎运行失败: {}", err));
        InferenceResult::default()
      }
    }
  }

  /// 释放引擎资源并进入终态 Closed。幂等，任何状态下调用都不报错。
  pub fn close(&mut self) {
    if matches!(self.slot, EngineSlot::Closed) {
      return;
    }
    if matches!(self.slot, EngineSlot::Ready(_)) {
      info!("检测器引擎资源已释放");
    }
    self.slot = EngineSlot::Closed;
  }
}
