// 该文件是 Guanwu （观物） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

use guanwu::FromUrl;
use guanwu::detector::{EngineOptions, SyntheticEngine};
use guanwu::input::SyntheticInput;
use guanwu::mapper::{ScaleFit, map_to_display};
use guanwu::pipeline::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let preview = args::parse_surface(&args.preview)?;
  let canvas = args::parse_surface(&args.canvas)?;

  info!("Guanwu 帧分析管道");
  info!("模型标识: {}", args.model);
  info!("输入帧源: {}", args.input);
  info!("置信度阈值: {}", args.confidence);
  info!("最大结果数: {}", args.max_results);
  info!("限流间隔: {} ms", args.interval_ms);

  let url = Url::parse(&args.input).context("输入帧源 URL 解析失败")?;
  let mut input = SyntheticInput::from_url(&url).context("无法打开输入帧源")?;
  let frame_interval = input.frame_interval();
  let (frame_w, frame_h) = input.dimensions();

  let config = PipelineConfig {
    model: args.model,
    options: EngineOptions {
      score_threshold: args.confidence,
      max_results: args.max_results,
    },
    frame_interval: Duration::from_millis(args.interval_ms),
  };
  let mut pipeline: Pipeline<SyntheticEngine> = Pipeline::new(config);
  let control = pipeline.control();

  control.initialize();
  info!("检测器状态: {:?}", control.state());

  // 错误流监视
  let mut errors = pipeline.subscribe_errors();
  let error_task = tokio::spawn(async move {
    while let Ok(event) = errors.recv().await {
      error!("[{}] {}", event.kind, event.message);
    }
  });

  // 结果流监视：映射到显示坐标后逐行输出 JSON
  let mut results = pipeline.subscribe_results();
  let frame_size = guanwu::mapper::SurfaceSize::new(frame_w as f32, frame_h as f32);
  let result_task = tokio::spawn(async move {
    while results.changed().await.is_ok() {
      let Some(result) = results.borrow_and_update().clone() else {
        continue;
      };
      let detections: Vec<_> = result
        .detections
        .iter()
        .map(|d| {
          let display = map_to_display(&d.bbox, frame_size, preview, canvas, ScaleFit::FillCenter);
          json!({
            "label": d.label,
            "score": d.score,
            "box": {
              "top": display.top,
              "left": display.left,
              "bottom": display.bottom,
              "right": display.right,
            },
          })
        })
        .collect();
      let line = json!({
        "elapsed_ms": result.elapsed_ms,
        "detections": detections,
      });
      println!("{}", line);
    }
  });

  let stop = Arc::new(AtomicBool::new(false));
  let stop_flag = stop.clone();
  ctrlc::set_handler(move || {
    warn!("收到中断信号，准备退出...");
    stop_flag.store(true, Ordering::SeqCst);
  })
  .context("无法安装 Ctrl-C 处理器")?;

  info!("开始帧交付循环...");
  let mut delivered = 0u64;
  while let Some(frame) = input.next() {
    if stop.load(Ordering::SeqCst) {
      // 帧在此处被丢弃，释放回调照常执行
      break;
    }
    pipeline.submit(frame);
    delivered += 1;
    tokio::time::sleep(frame_interval).await;
  }

  info!("帧交付结束，共 {} 帧，关闭检测器", delivered);
  control.close();

  drop(pipeline);
  drop(control);
  let _ = tokio::time::timeout(Duration::from_secs(1), result_task).await;
  let _ = tokio::time::timeout(Duration::from_secs(1), error_task).await;

  info!("任务完成，退出");
  Ok(())
}
