// 该文件是 Guanwu （观物） 项目的一部分。
// src/throttle.rs - 帧限流器
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

use std::time::Duration;

/// 默认帧间隔：100 毫秒，即约每秒最多 10 帧
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// 基于时间戳的帧限流器。
///
/// 仅由帧交付线程访问；纯时间门控，与上一帧是否处理完毕无关。
#[derive(Debug, Clone)]
pub struct FrameThrottler {
  interval: Duration,
  last_admitted: Option<u64>,
}

impl FrameThrottler {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last_admitted: None,
    }
  }

  /// 判定时间戳为 `timestamp_ms` 的帧是否放行。
  ///
  /// 首帧总是放行；其后仅当与上一放行帧间隔不小于配置间隔时放行，
  /// 并且只在放行时更新内部时间戳。被拒绝的帧仍需由调用方释放。
  pub fn admit(&mut self, timestamp_ms: u64) -> bool {
    match self.last_admitted {
      Some(last)
        if Duration::from_millis(timestamp_ms.saturating_sub(last)) < self.interval =>
      {
        false
      }
      _ => {
        self.last_admitted = Some(timestamp_ms);
        true
      }
    }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }
}

impl Default for FrameThrottler {
  fn default() -> Self {
    Self::new(DEFAULT_FRAME_INTERVAL)
  }
}
