// 该文件是 Guanwu （观物） 项目的一部分。
// src/frame.rs - 多平面原始帧与分析帧定义
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

use image::RgbImage;

/// 单个像素平面缓冲区（YUV_420_888 风格）
#[derive(Debug, Clone)]
pub struct PlaneBuffer {
  /// 平面字节数据
  pub data: Vec<u8>,
  /// 行跨度（字节）
  pub row_stride: usize,
  /// 像素跨度（字节）
  pub pixel_stride: usize,
}

impl PlaneBuffer {
  pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data,
      row_stride,
      pixel_stride,
    }
  }

  /// 紧密排列的平面（像素跨度为 1，行跨度等于宽度）
  pub fn packed(data: Vec<u8>, width: usize) -> Self {
    Self::new(data, width, 1)
  }
}

/// 相机传感器交付的多平面原始帧。
///
/// 原始帧独占底层原生缓冲区，释放回调在帧被丢弃时执行，
/// 且在任何路径上都恰好执行一次（由 Drop 保证）。
pub struct RawFrame {
  /// 帧宽度（像素）
  pub width: u32,
  /// 帧高度（像素）
  pub height: u32,
  /// 传感器旋转角度（90 的倍数，顺时针）
  pub rotation_degrees: i32,
  /// 单调采集时间戳（毫秒）
  pub timestamp_ms: u64,
  planes: [PlaneBuffer; 3],
  release: Option<Box<dyn FnOnce() + Send>>,
}

impl RawFrame {
  pub fn new(
    width: u32,
    height: u32,
    planes: [PlaneBuffer; 3],
    rotation_degrees: i32,
    timestamp_ms: u64,
  ) -> Self {
    Self {
      width,
      height,
      rotation_degrees,
      timestamp_ms,
      planes,
      release: None,
    }
  }

  /// 附加原生缓冲区释放回调
  pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
    self.release = Some(Box::new(hook));
    self
  }

  /// 亮度平面
  pub fn luma(&self) -> &PlaneBuffer {
    &self.planes[0]
  }

  /// 色度 U 平面
  pub fn chroma_u(&self) -> &PlaneBuffer {
    &self.planes[1]
  }

  /// 色度 V 平面
  pub fn chroma_v(&self) -> &PlaneBuffer {
    &self.planes[2]
  }
}

impl Drop for RawFrame {
  fn drop(&mut self) {
    if let Some(hook) = self.release.take() {
      hook();
    }
  }
}

/// 旋转校正后的单层交错栅格图像，供检测器一次性消费
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
  image: RgbImage,
}

impl AnalysisFrame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }
}

impl From<RgbImage> for AnalysisFrame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}
