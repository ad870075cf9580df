// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 输出解码
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

//! 两种解码方式：
//!
//! - 融合输出 `[1, N, dimensions]`，目标置信度与类别分数已是概率，坐标为模型输入空间的 xywh；
//! - 原始输出，每个尺度一个 `[1, anchors, grid, grid, dimensions]`，需要 sigmoid 与锚框解码。
//!
//! 两者都把框映射回原图并裁剪，候选结果按循环顺序收集，与是否并行无关。

use ndarray::{ArrayView1, ArrayViewD, s};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, error};

use crate::{
  input::LetterboxGeometry,
  model::{BBox, ConfigError, DecodeMode, Detection, ModelConfig, ScaleConfig, Yolov5Error},
};

const BOX_OBJECTNESS: usize = 4;
const BOX_CLASSES: usize = 5;

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 按配置的解码方式分派；`outputs` 的顺序与配置中声明的输出顺序一致
pub fn decode<'a>(
  outputs: &[(&str, ArrayViewD<'_, f32>)],
  config: &'a ModelConfig,
  geometry: &LetterboxGeometry,
) -> Result<Vec<Detection<'a>>, Yolov5Error> {
  match &config.decode {
    DecodeMode::Fused => {
      let (name, output) = outputs.first().ok_or(ConfigError::NoOutputs)?;
      decode_fused(name, output.view(), config, geometry)
    }
    DecodeMode::Raw { scales } => decode_raw(outputs, scales, config, geometry),
  }
}

/// 融合输出解码：每行可按类别产生多个检测结果
pub fn decode_fused<'a>(
  name: &str,
  output: ArrayViewD<'_, f32>,
  config: &'a ModelConfig,
  geometry: &LetterboxGeometry,
) -> Result<Vec<Detection<'a>>, Yolov5Error> {
  let dimensions = config.dimensions;
  let last_axis = output.shape().last().copied().unwrap_or(0);
  if last_axis != dimensions {
    error!(
      "输出 {} 形状 {:?} 的最后一维应为 {}",
      name,
      output.shape(),
      dimensions
    );
    return Err(Yolov5Error::OutputShapeMismatch {
      name: name.to_string(),
      expected: dimensions,
      actual: last_axis,
    });
  }

  let predictions = output.len() / dimensions;
  let rows = output
    .to_shape((predictions, dimensions))
    .map_err(|_| Yolov5Error::OutputShapeMismatch {
      name: name.to_string(),
      expected: predictions * dimensions,
      actual: output.len(),
    })?;

  let decode_row = |i: usize| fused_row(rows.row(i), config, geometry);

  #[cfg(feature = "parallel")]
  let items: Vec<_> = (0..predictions)
    .into_par_iter()
    .flat_map_iter(decode_row)
    .collect();
  #[cfg(not(feature = "parallel"))]
  let items: Vec<_> = (0..predictions).flat_map(decode_row).collect();

  debug!("融合输出 {}: {} 行, {} 个候选", name, predictions, items.len());
  Ok(items)
}

fn fused_row<'a>(
  row: ArrayView1<'_, f32>,
  config: &'a ModelConfig,
  geometry: &LetterboxGeometry,
) -> Vec<Detection<'a>> {
  let objectness = row[BOX_OBJECTNESS];
  if objectness <= config.confidence {
    return Vec::new();
  }

  let Some(bbox) = geometry.unmap(BBox::xywh_to_xyxy([row[0], row[1], row[2], row[3]])) else {
    return Vec::new();
  };

  (BOX_CLASSES..config.dimensions)
    .filter_map(|k| {
      let score = row[k] * objectness;
      if score <= config.mul_confidence {
        return None;
      }
      Some(Detection {
        label: config.labels.get(k - BOX_CLASSES)?,
        score,
        bbox,
      })
    })
    .collect()
}

/// 原始输出解码：每个 (尺度, 锚框, 行, 列) 至多产生一个检测结果
pub fn decode_raw<'a>(
  outputs: &[(&str, ArrayViewD<'_, f32>)],
  scales: &[ScaleConfig],
  config: &'a ModelConfig,
  geometry: &LetterboxGeometry,
) -> Result<Vec<Detection<'a>>, Yolov5Error> {
  if outputs.len() != scales.len() {
    return Err(
      ConfigError::ScaleCountMismatch {
        outputs: outputs.len(),
        scales: scales.len(),
      }
      .into(),
    );
  }

  let dimensions = config.dimensions;
  let mut items = Vec::new();

  for ((name, output), scale) in outputs.iter().zip(scales) {
    let (anchors, grid) = (scale.anchors.len(), scale.grid);
    let expected = anchors * grid * grid * dimensions;
    if output.len() != expected {
      error!(
        "输出 {} 元素数量 {} 与尺度 (锚框 {}, 网格 {}) 不匹配",
        name,
        output.len(),
        anchors,
        grid
      );
      return Err(Yolov5Error::OutputShapeMismatch {
        name: name.to_string(),
        expected,
        actual: output.len(),
      });
    }

    let cells = output
      .to_shape((anchors, grid, grid, dimensions))
      .map_err(|_| Yolov5Error::OutputShapeMismatch {
        name: name.to_string(),
        expected,
        actual: output.len(),
      })?;

    let decode_cell = |index: usize| {
      let a = index / (grid * grid);
      let y = (index / grid) % grid;
      let x = index % grid;
      raw_cell(
        cells.slice(s![a, y, x, ..]),
        (x, y),
        scale.stride,
        scale.anchors[a],
        config,
        geometry,
      )
    };

    let before = items.len();
    #[cfg(feature = "parallel")]
    items.par_extend(
      (0..anchors * grid * grid)
        .into_par_iter()
        .filter_map(decode_cell),
    );
    #[cfg(not(feature = "parallel"))]
    items.extend((0..anchors * grid * grid).filter_map(decode_cell));

    debug!(
      "原始输出 {}: 网格 {}x{}, 步长 {}, {} 个候选",
      name,
      grid,
      grid,
      scale.stride,
      items.len() - before
    );
  }

  Ok(items)
}

fn raw_cell<'a>(
  raw: ArrayView1<'_, f32>,
  (x, y): (usize, usize),
  stride: f32,
  [anchor_w, anchor_h]: [f32; 2],
  config: &'a ModelConfig,
  geometry: &LetterboxGeometry,
) -> Option<Detection<'a>> {
  let objectness = sigmoid(raw[BOX_OBJECTNESS]);
  if objectness <= config.confidence {
    return None;
  }

  // 相同分数取第一个类别
  let (class, score) = raw
    .iter()
    .skip(BOX_CLASSES)
    .map(|&logit| sigmoid(logit) * objectness)
    .enumerate()
    .fold((0, f32::MIN), |best, (k, score)| {
      if score > best.1 { (k, score) } else { best }
    });
  if score <= config.mul_confidence {
    return None;
  }

  let cx = (sigmoid(raw[0]) * 2.0 - 0.5 + x as f32) * stride;
  let cy = (sigmoid(raw[1]) * 2.0 - 0.5 + y as f32) * stride;
  let w = (sigmoid(raw[2]) * 2.0).powi(2) * anchor_w;
  let h = (sigmoid(raw[3]) * 2.0).powi(2) * anchor_h;

  let bbox = geometry.unmap(BBox::xywh_to_xyxy([cx, cy, w, h]))?;
  Some(Detection {
    label: config.labels.get(class)?,
    score,
    bbox,
  })
}
