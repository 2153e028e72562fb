// 该文件是 Guanwu （观物） 项目的一部分。
// src/convert.rs - 原始帧到分析帧的转换
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

use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder, imageops};
use thiserror::Error;
use tracing::trace;

use crate::frame::{AnalysisFrame, PlaneBuffer, RawFrame};

/// JPEG 往返压缩质量（0 - 100）
pub const JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("帧尺寸无效: {width}x{height}（宽高必须为非零偶数）")]
  BadDimensions { width: u32, height: u32 },
  #[error("{plane} 平面过小: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  PlaneTooSmall {
    plane: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("{plane} 平面跨度无效: 行跨度 {row_stride}, 像素跨度 {pixel_stride}")]
  BadStride {
    plane: &'static str,
    row_stride: usize,
    pixel_stride: usize,
  },
  #[error("旋转角度无效: {0}（必须为 90 的倍数）")]
  BadRotation(i32),
  #[error("JPEG 编解码失败: {0}")]
  Jpeg(#[from] image::ImageError),
}

/// 原始多平面帧到分析帧的转换器。
///
/// 沿用 NV21 拼装加 JPEG 往返的策略：把亮度与色度平面交错成
/// NV21 字节序列（V 在 U 之前），解码为 RGB 后按固定质量走一次
/// JPEG 编解码，再做旋转校正。JPEG 往返是刻意保留的简化手段，
/// 用少量 CPU 与画质换掉一条独立的色彩空间转换路径。
#[derive(Debug, Clone)]
pub struct FrameConverter {
  jpeg_quality: u8,
}

impl FrameConverter {
  pub fn new(jpeg_quality: u8) -> Self {
    Self { jpeg_quality }
  }

  /// 把一个原始帧转换为旋转校正后的分析帧。
  ///
  /// 无论成功与否，传入的原始帧都会在本函数内被消费并释放。
  pub fn convert(&self, frame: RawFrame) -> Result<AnalysisFrame, ConvertError> {
    let width = frame.width;
    let height = frame.height;
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
      return Err(ConvertError::BadDimensions { width, height });
    }
    if frame.rotation_degrees % 90 != 0 {
      return Err(ConvertError::BadRotation(frame.rotation_degrees));
    }

    let nv21 = interleave_nv21(&frame)?;
    trace!("帧 {} 拼装为 NV21, 共 {} 字节", frame.timestamp_ms, nv21.len());

    let rgb = nv21_to_rgb(&nv21, width, height);
    let rgb = self.jpeg_round_trip(&rgb)?;
    let rotated = apply_rotation(rgb, frame.rotation_degrees);

    Ok(AnalysisFrame::from(rotated))
  }

  fn jpeg_round_trip(&self, rgb: &RgbImage) -> Result<RgbImage, ConvertError> {
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality);
    encoder.encode_image(rgb)?;
    let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
  }
}

impl Default for FrameConverter {
  fn default() -> Self {
    Self::new(JPEG_QUALITY)
  }
}

fn check_plane(
  plane: &PlaneBuffer,
  name: &'static str,
  width: usize,
  height: usize,
) -> Result<(), ConvertError> {
  if plane.pixel_stride == 0 || plane.row_stride < width * plane.pixel_stride {
    return Err(ConvertError::BadStride {
      plane: name,
      row_stride: plane.row_stride,
      pixel_stride: plane.pixel_stride,
    });
  }
  // 末行允许省略跨度填充
  let expected = (height - 1) * plane.row_stride + (width - 1) * plane.pixel_stride + 1;
  if plane.data.len() < expected {
    return Err(ConvertError::PlaneTooSmall {
      plane: name,
      expected,
      actual: plane.data.len(),
    });
  }
  Ok(())
}

/// 把三个平面交错为 NV21 字节序列：完整亮度平面在前，
/// 其后按 V、U 的固定顺序逐对交错半分辨率色度。
fn interleave_nv21(frame: &RawFrame) -> Result<Vec<u8>, ConvertError> {
  let w = frame.width as usize;
  let h = frame.height as usize;
  let (cw, ch) = (w / 2, h / 2);

  let luma = frame.luma();
  let u = frame.chroma_u();
  let v = frame.chroma_v();
  check_plane(luma, "亮度", w, h)?;
  check_plane(u, "色度 U", cw, ch)?;
  check_plane(v, "色度 V", cw, ch)?;

  let mut nv21 = Vec::with_capacity(w * h + w * h / 2);
  for row in 0..h {
    for col in 0..w {
      nv21.push(luma.data[row * luma.row_stride + col * luma.pixel_stride]);
    }
  }
  for row in 0..ch {
    for col in 0..cw {
      nv21.push(v.data[row * v.row_stride + col * v.pixel_stride]);
      nv21.push(u.data[row * u.row_stride + col * u.pixel_stride]);
    }
  }
  Ok(nv21)
}

/// NV21 解码为 RGB（BT.601 全量程）
fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> RgbImage {
  let w = width as usize;
  let chroma_base = w * height as usize;
  RgbImage::from_fn(width, height, |x, y| {
    let luma = nv21[y as usize * w + x as usize] as f32;
    let ci = chroma_base + (y as usize / 2) * w + (x as usize / 2) * 2;
    let cv = nv21[ci] as f32 - 128.0;
    let cu = nv21[ci + 1] as f32 - 128.0;

    let r = luma + 1.402 * cv;
    let g = luma - 0.344_136 * cu - 0.714_136 * cv;
    let b = luma + 1.772 * cu;
    image::Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
  })
}

fn clamp_u8(v: f32) -> u8 {
  v.round().clamp(0.0, 255.0) as u8
}

/// 按传感器旋转角度做顺时针旋转校正
fn apply_rotation(image: RgbImage, rotation_degrees: i32) -> RgbImage {
  match rotation_degrees.rem_euclid(360) {
    90 => imageops::rotate90(&image),
    180 => imageops::rotate180(&image),
    270 => imageops::rotate270(&image),
    _ => image,
  }
}
