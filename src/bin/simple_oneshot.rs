// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测并保存标注结果
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use shanan_scorer::{
  FromUrl,
  engine::ReplayEngine,
  input::ImageFileInput,
  model::Yolov5Builder,
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置，例如 yolov5://coco-p5 或 yolov5:///path/to/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 记录的推理输出，例如 replay:///path/to/outputs.json
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入图像，例如 image:///path/to/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像，例如 image:///path/to/output.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签文本使用的字体文件，不指定时只画框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
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
  let mut output = SaveImageFileOutput::from_url(&args.output)?;
  if let Some(font) = &args.font {
    output = output.with_font_file(font)?;
  }

  OneShotTask.run_task(input, &model, output)?;

  Ok(())
}
