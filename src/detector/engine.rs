// 该文件是 Guanwu （观物） 项目的一部分。
// src/detector/engine.rs - 推理引擎接口与合成引擎
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

use thiserror::Error;
use tracing::debug;

use crate::detector::{BoundingBox, Detection};
use crate::frame::AnalysisFrame;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型资源不存在或无法读取: {0}")]
  ModelUnavailable(String),
  #[error("推理失败: {0}")]
  Inference(String),
}

/// 推理引擎配置。阈值过滤与数量截断由引擎按此配置完成。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
  /// 置信度阈值（0 - 1）
  pub score_threshold: f32,
  /// 最大检测结果数
  pub max_results: usize,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      score_threshold: 0.5,
      max_results: 3,
    }
  }
}

/// 推理引擎接口：从模型标识加载，对分析帧产出检测结果。
///
/// 引擎返回的边界框坐标归一化到 [0, 1]，结果已按配置过滤、
/// 截断并保持引擎内部的排序。
pub trait Engine: Send + 'static {
  fn load(model: &str, options: EngineOptions) -> Result<Self, EngineError>
  where
    Self: Sized;

  fn infer(&mut self, frame: &AnalysisFrame) -> Result<Vec<Detection>, EngineError>;
}

/// 确定性的合成推理引擎，供演示程序与联调使用，
/// 角色类似 GStreamer 的 videotestsrc。
#[derive(Debug)]
pub struct SyntheticEngine {
  options: EngineOptions,
  tick: u64,
}

/// 合成引擎的候选目标（标签、基准置信度）
const SYNTHETIC_CANDIDATES: [(&str, f32); 3] =
  [("person", 0.92), ("cup", 0.61), ("chair", 0.38)];

impl Engine for SyntheticEngine {
  fn load(model: &str, options: EngineOptions) -> Result<Self, EngineError> {
    if model.trim().is_empty() {
      return Err(EngineError::ModelUnavailable("模型标识为空".to_string()));
    }
    debug!("合成引擎以模型标识 {} 加载", model);
    Ok(Self { options, tick: 0 })
  }

  fn infer(&mut self, _frame: &AnalysisFrame) -> Result<Vec<Detection>, EngineError> {
    self.tick = self.tick.wrapping_add(1);
    // 让框随帧序缓慢漂移，便于观察叠加层是否在动
    let drift = (self.tick % 16) as f32 / 160.0;

    let detections = SYNTHETIC_CANDIDATES
      .iter()
      .filter(|(_, score)| *score >= self.options.score_threshold)
      .take(self.options.max_results)
      .enumerate()
      .map(|(i, (label, score))| {
        let base = 0.1 + i as f32 * 0.15;
        Detection {
          label: label.to_string(),
          score: *score,
          bbox: BoundingBox {
            top: base + drift,
            left: base,
            bottom: (base + 0.3 + drift).min(1.0),
            right: (base + 0.3).min(1.0),
          },
        }
      })
      .collect();

    Ok(detections)
  }
}
