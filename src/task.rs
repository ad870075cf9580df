// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 单次与重复推理任务
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

use std::time::{Duration, Instant};

use anyhow::Context;
use image::RgbImage;
use tracing::{info, warn};

use crate::{
  engine::InferenceEngine,
  model::{DetectResult, Yolov5},
  output::Render,
};

// 预热次数，不计入平均耗时
const WARMUP_TIMES: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<'m, E, RE, I, O> Task<I, &'m Yolov5<E>, O> for OneShotTask
where
  E: InferenceEngine,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  O: Render<RgbImage, DetectResult<'m>, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: &'m Yolov5<E>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().context("没有输入帧")?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.predict(&frame)?;
    info!("推理完成，{} 个结果，耗时: {:.2?}", result.len(), now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复推理，报告去掉预热后的平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times;
    self
  }
}

impl<'m, E, RE, I, O> Task<I, &'m Yolov5<E>, O> for RepeatShotTask
where
  E: InferenceEngine,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  O: Render<RgbImage, DetectResult<'m>, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: &'m Yolov5<E>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().context("没有输入帧")?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let result = model
        .predict(&frame)
        .with_context(|| format!("第 {} 次推理失败", i))?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    if times.len() > WARMUP_TIMES {
      warn!(
        "平均推理时间: {:.2?}",
        times.iter().skip(WARMUP_TIMES).sum::<Duration>() / (times.len() - WARMUP_TIMES) as u32
      );
    } else {
      warn!("重复次数 {} 不足以计算平均推理时间", times.len());
    }

    Ok(())
  }
}
