// 该文件是 Guanwu （观物） 项目的一部分。
// src/args.rs - 项目参数配置
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

use anyhow::{Context, Result, bail};
use clap::Parser;

use guanwu::mapper::SurfaceSize;

/// Guanwu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型标识（交给推理引擎加载）
  #[arg(long, default_value = "model.tflite", value_name = "MODEL")]
  pub model: String,

  /// 输入帧源 URL
  /// 支持格式:
  /// - 合成源: synthetic:?width=640&height=480&fps=30&rotation=90&frames=300
  #[arg(long, default_value = "synthetic:?width=640&height=480&fps=30", value_name = "SOURCE")]
  pub input: String,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 最大检测结果数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub max_results: usize,

  /// 帧限流间隔（毫秒）
  #[arg(long, default_value = "100", value_name = "MILLIS")]
  pub interval_ms: u64,

  /// 预览面尺寸（宽x高）
  #[arg(long, default_value = "1080x1920", value_name = "WxH")]
  pub preview: String,

  /// 叠加画布尺寸（宽x高）
  #[arg(long, default_value = "1080x1920", value_name = "WxH")]
  pub canvas: String,
}

/// 解析 “宽x高” 形式的表面尺寸
pub fn parse_surface(value: &str) -> Result<SurfaceSize> {
  let Some((w, h)) = value.split_once('x') else {
    bail!("表面尺寸格式应为 宽x高: {}", value);
  };
  let width: f32 = w.trim().parse().with_context(|| format!("宽度无效: {}", w))?;
  let height: f32 = h.trim().parse().with_context(|| format!("高度无效: {}", h))?;
  if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
    bail!("表面尺寸必须为正的有限值: {}", value);
  }
  Ok(SurfaceSize::new(width, height))
}
