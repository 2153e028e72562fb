// 该文件是 Guanwu （观物） 项目的一部分。
// src/mapper.rs - 归一化边界框到显示坐标的映射
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

use crate::detector::BoundingBox;

/// 帧到预览面的缩放适配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleFit {
  /// 按长宽比适配并居中（默认）
  #[default]
  FillCenter,
  /// 各轴独立拉伸，不居中（不支持的适配模式回退到此）
  Stretch,
}

/// 一个显示表面的尺寸（像素）。两边都必须为正的有限值，
/// 否则缩放因子退化为 NaN 并静默污染映射结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
  pub width: f32,
  pub height: f32,
}

impl SurfaceSize {
  /// # Panics
  ///
  /// 任一边为零、负数或非有限值时 panic。
  pub fn new(width: f32, height: f32) -> Self {
    assert!(
      width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite(),
      "表面尺寸必须为正的有限值: {}x{}",
      width,
      height
    );
    Self { width, height }
  }

  pub fn aspect(&self) -> f32 {
    self.width / self.height
  }
}

/// 显示坐标系中的边界框（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBox {
  pub top: f32,
  pub left: f32,
  pub bottom: f32,
  pub right: f32,
}

/// 第一阶段：归一化框从分析帧空间映射到预览面空间。
///
/// FillCenter 比较两侧长宽比：预览面相对更宽时按高适配，
/// 否则按宽适配，并把缩放后的矩形在预览面内居中。
/// Stretch 各轴独立缩放，无居中偏移。
pub fn frame_to_preview(
  bbox: &BoundingBox,
  frame: SurfaceSize,
  preview: SurfaceSize,
  fit: ScaleFit,
) -> DisplayBox {
  let (scaled_w, scaled_h, offset_x, offset_y) = match fit {
    ScaleFit::FillCenter => {
      let frame_aspect = frame.aspect();
      if preview.aspect() > frame_aspect {
        // 预览面相对更宽：按高适配
        let scaled_h = preview.height;
        let scaled_w = preview.height * frame_aspect;
        (scaled_w, scaled_h, (preview.width - scaled_w) / 2.0, 0.0)
      } else {
        // 预览面相对更高：按宽适配
        let scaled_w = preview.width;
        let scaled_h = preview.width / frame_aspect;
        (scaled_w, scaled_h, 0.0, (preview.height - scaled_h) / 2.0)
      }
    }
    ScaleFit::Stretch => (preview.width, preview.height, 0.0, 0.0),
  };

  DisplayBox {
    top: bbox.top * scaled_h + offset_y,
    left: bbox.left * scaled_w + offset_x,
    bottom: bbox.bottom * scaled_h + offset_y,
    right: bbox.right * scaled_w + offset_x,
  }
}

/// 第二阶段：预览面空间到叠加画布空间的各轴独立缩放。
/// 叠加画布不必与预览面像素一致，因此两阶段组合而非合并。
pub fn preview_to_canvas(bbox: &DisplayBox, preview: SurfaceSize, canvas: SurfaceSize) -> DisplayBox {
  let scale_x = canvas.width / preview.width;
  let scale_y = canvas.height / preview.height;
  DisplayBox {
    top: bbox.top * scale_y,
    left: bbox.left * scale_x,
    bottom: bbox.bottom * scale_y,
    right: bbox.right * scale_x,
  }
}

/// 两阶段组合：分析帧空间 → 预览面空间 → 叠加画布空间。
///
/// 结果不做画布边界裁剪：FillCenter 下靠近帧边缘的目标
/// 可以合法地映射到可见画布之外。
pub fn map_to_display(
  bbox: &BoundingBox,
  frame: SurfaceSize,
  preview: SurfaceSize,
  canvas: SurfaceSize,
  fit: ScaleFit,
) -> DisplayBox {
  let preview_box = frame_to_preview(bbox, frame, preview, fit);
  preview_to_canvas(&preview_box, preview, canvas)
}
