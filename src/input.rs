// 该文件是 Guanwu （观物） 项目的一部分。
// src/input.rs - 合成视频帧源
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::frame::{PlaneBuffer, RawFrame};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数无效: {0}")]
  BadParameter(String),
}

const SYNTHETIC_SCHEME: &str = "synthetic";

/// 合成视频帧源，外部相机源的内建替身。
///
/// 按固定帧率产出亮度随帧序漂移的灰阶帧，一次只交出一帧，
/// 天然满足"只交付最新帧"的背压约定。
pub struct SyntheticInput {
  width: u32,
  height: u32,
  rotation_degrees: i32,
  interval_ms: u64,
  frame_limit: Option<u64>,
  index: u64,
}

impl FromUrl for SyntheticInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != SYNTHETIC_SCHEME {
      return Err(InputError::SchemeMismatch);
    }

    let mut width = 640u32;
    let mut height = 480u32;
    let mut fps = 30u64;
    let mut rotation = 0i32;
    let mut frame_limit = None;

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => width = parse_param(&key, &value)?,
        "height" => height = parse_param(&key, &value)?,
        "fps" => fps = parse_param(&key, &value)?,
        "rotation" => rotation = parse_param(&key, &value)?,
        "frames" => frame_limit = Some(parse_param(&key, &value)?),
        other => {
          return Err(InputError::BadParameter(format!("未知参数 {}", other)));
        }
      }
    }

    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
      return Err(InputError::BadParameter(format!(
        "帧尺寸必须为非零偶数: {}x{}",
        width, height
      )));
    }
    if fps == 0 || fps > 1000 {
      return Err(InputError::BadParameter(format!("帧率无效: {}", fps)));
    }
    if rotation % 90 != 0 {
      return Err(InputError::BadParameter(format!("旋转角度无效: {}", rotation)));
    }

    info!(
      "合成帧源: {}x{} @ {}fps, 旋转 {} 度",
      width, height, fps, rotation
    );
    Ok(Self {
      width,
      height,
      rotation_degrees: rotation,
      interval_ms: 1000 / fps,
      frame_limit,
      index: 0,
    })
  }
}

impl FromUrlWithScheme for SyntheticInput {
  const SCHEME: &'static str = SYNTHETIC_SCHEME;
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, InputError> {
  value
    .parse()
    .map_err(|_| InputError::BadParameter(format!("{} = {}", key, value)))
}

impl SyntheticInput {
  /// 两帧之间的采集间隔
  pub fn frame_interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }
}

impl Iterator for SyntheticInput {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.frame_limit.is_some_and(|limit| self.index >= limit) {
      return None;
    }

    let (w, h) = (self.width as usize, self.height as usize);
    let luma_value = 96u8.wrapping_add((self.index % 64) as u8);
    let frame = RawFrame::new(
      self.width,
      self.height,
      [
        PlaneBuffer::packed(vec![luma_value; w * h], w),
        PlaneBuffer::packed(vec![128u8; w * h / 4], w / 2),
        PlaneBuffer::packed(vec![128u8; w * h / 4], w / 2),
      ],
      self.rotation_degrees,
      self.index * self.interval_ms,
    );

    self.index += 1;
    Some(frame)
  }
}
