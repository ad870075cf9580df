// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理同一张图像并统计耗时
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

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use shanan_scorer::{
  FromUrl,
  engine::ReplayEngine,
  input::ImageFileInput,
  model::Yolov5Builder,
  output::SaveImageFileOutput,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 重复推理基准
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 记录的推理输出
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value = "1000", value_name = "TIMES")]
  pub times: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置: {}", args.model);
  info!("推理引擎: {}", args.engine);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let engine = ReplayEngine::from_url(&args.engine).context("无法加载推理输出")?;
  let model = Yolov5Builder::from_url(&args.model)
    .context("无法加载模型配置")?
    .build(engine)?;
  let input = ImageFileInput::from_url(&args.input).context("无法读取输入图像")?;
  let output = SaveImageFileOutput::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_times(args.times)
    .run_task(input, &model, output)?;

  Ok(())
}
