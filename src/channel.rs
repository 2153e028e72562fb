// 该文件是 Guanwu （观物） 项目的一部分。
// src/channel.rs - 检测结果与错误事件分发通道
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

use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::detector::InferenceResult;

/// 错误通道容量：最多缓存一条未消费消息，溢出时丢弃最旧一条
pub const ERROR_CHANNEL_CAPACITY: usize = 1;

/// 管道内部错误的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// 模型资源缺失或不可读，初始化失败
  ModelLoad,
  /// 检测器未就绪（未初始化或已关闭）时收到推理请求
  DetectorNotReady,
  /// 交给检测器的帧不是预期的分析帧
  InvalidInput,
  /// 原始帧平面数据异常，转换失败
  Conversion,
  /// 推理引擎在结构合法的输入上运行失败
  InferenceRuntime,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::ModelLoad => "model_load",
      ErrorKind::DetectorNotReady => "detector_not_ready",
      ErrorKind::InvalidInput => "invalid_input",
      ErrorKind::Conversion => "conversion",
      ErrorKind::InferenceRuntime => "inference_runtime",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 错误流上的一条事件：分类加可读消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
  pub kind: ErrorKind,
  pub message: String,
}

/// 错误事件发送端，可跨组件克隆共享
#[derive(Clone)]
pub struct ErrorSender {
  tx: broadcast::Sender<ErrorEvent>,
}

impl ErrorSender {
  /// 上报一条错误事件。无订阅者时事件直接丢弃，不视为失败。
  pub fn report(&self, kind: ErrorKind, message: impl Into<String>) {
    let message = message.into();
    warn!("管道错误 [{}]: {}", kind, message);
    let _ = self.tx.send(ErrorEvent { kind, message });
  }
}

/// 检测结果与错误事件的扇出通道。
///
/// 结果流是仅保留最新值的 watch 通道：新结果直接替换旧结果，
/// 订阅者永远只观察到最近一次推理。错误流是容量为 1 的广播通道，
/// 未消费的旧错误被新错误挤掉，迟到的订阅者不回放历史。
pub struct ResultChannel {
  results_tx: watch::Sender<Option<InferenceResult>>,
  errors_tx: broadcast::Sender<ErrorEvent>,
}

impl ResultChannel {
  pub fn new() -> Self {
    let (results_tx, _) = watch::channel(None);
    let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
    Self {
      results_tx,
      errors_tx,
    }
  }

  /// 发布最新一次推理结果，替换任何未被消费的旧结果
  pub fn publish(&self, result: InferenceResult) {
    self.results_tx.send_replace(Some(result));
  }

  pub fn error_sender(&self) -> ErrorSender {
    ErrorSender {
      tx: self.errors_tx.clone(),
    }
  }

  pub fn subscribe_results(&self) -> watch::Receiver<Option<InferenceResult>> {
    self.results_tx.subscribe()
  }

  pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
    self.errors_tx.subscribe()
  }
}

impl Default for ResultChannel {
  fn default() -> Self {
    Self::new()
  }
}
