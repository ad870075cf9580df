// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/config.rs - 模型配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Label, labels::coco_labels},
};

const YOLOV5_INPUT_NAME: &str = "images";
const YOLOV5_FUSED_OUTPUT: &str = "output";
const YOLOV5_COCO_DIMENSIONS: usize = 85;
const YOLOV5_CONFIDENCE: f32 = 0.20;
const YOLOV5_MUL_CONFIDENCE: f32 = 0.25;
const YOLOV5_OVERLAP: f32 = 0.45;

const P5_INPUT_SIZE: u32 = 640;
const P5_GRIDS: [usize; 3] = [80, 40, 20];
const P5_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const P5_ANCHORS: [[[f32; 2]; 3]; 3] = [
  [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
  [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
  [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
];

const P6_INPUT_SIZE: u32 = 1280;
const P6_GRIDS: [usize; 4] = [160, 80, 40, 20];
const P6_STRIDES: [f32; 4] = [8.0, 16.0, 32.0, 64.0];
const P6_ANCHORS: [[[f32; 2]; 3]; 4] = [
  [[19.0, 27.0], [44.0, 40.0], [38.0, 94.0]],
  [[96.0, 68.0], [86.0, 152.0], [180.0, 137.0]],
  [[140.0, 301.0], [303.0, 264.0], [238.0, 542.0]],
  [[436.0, 615.0], [739.0, 380.0], [925.0, 792.0]],
];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: u32, height: u32 },
  #[error("每个锚框的预测维度必须大于 5, 实际为 {0}")]
  InvalidDimensions(usize),
  #[error("标签数量不匹配: 期望 {expected} (dimensions - 5), 实际 {actual}")]
  LabelCountMismatch { expected: usize, actual: usize },
  #[error("标签 id 不连续: 下标 {index} 的标签 id 为 {id}")]
  LabelIdMismatch { index: usize, id: u32 },
  #[error("阈值 {name} 超出 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("未声明任何输出张量")]
  NoOutputs,
  #[error("输出数量 {outputs} 与尺度数量 {scales} 不一致")]
  ScaleCountMismatch { outputs: usize, scales: usize },
  #[error("第 {0} 个尺度的网格、步长或锚框为空")]
  EmptyScale(usize),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未知的预设模型: {0}")]
  UnknownPreset(String),
  #[error("查询参数 {key} 的值无效: {value}")]
  InvalidQuery { key: String, value: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 原始输出的单个尺度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
  /// 网格边长（行列相同）
  pub grid: usize,
  pub stride: f32,
  /// 每个锚框的 `[w, h]`
  pub anchors: Vec<[f32; 2]>,
}

/// 解码方式，加载配置时确定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecodeMode {
  /// 单个输出，sigmoid 和网格运算已在网络内完成
  Fused,
  /// 每个尺度一个输出，需要手动 sigmoid 与锚框解码
  Raw { scales: Vec<ScaleConfig> },
}

/// 模型配置，对一个网络而言只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
  pub width: u32,
  pub height: u32,
  /// 每个锚框的预测维度：4 个坐标 + 1 个目标置信度 + 类别数
  pub dimensions: usize,
  /// 目标置信度阈值
  pub confidence: f32,
  /// 类别置信度（目标置信度 × 类别分数）阈值
  pub mul_confidence: f32,
  /// 抑制时的重叠阈值
  pub overlap: f32,
  #[serde(default = "ModelConfig::default_input_name")]
  pub input_name: String,
  /// 按解码顺序排列的输出张量名称
  pub outputs: Vec<String>,
  pub decode: DecodeMode,
  pub labels: Vec<Label>,
}

impl ModelConfig {
  fn default_input_name() -> String {
    YOLOV5_INPUT_NAME.to_string()
  }

  fn coco(size: u32, decode: DecodeMode, outputs: Vec<String>) -> Self {
    Self {
      width: size,
      height: size,
      dimensions: YOLOV5_COCO_DIMENSIONS,
      confidence: YOLOV5_CONFIDENCE,
      mul_confidence: YOLOV5_MUL_CONFIDENCE,
      overlap: YOLOV5_OVERLAP,
      input_name: Self::default_input_name(),
      outputs,
      decode,
      labels: coco_labels(),
    }
  }

  fn raw_outputs(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("output{}", i)).collect()
  }

  fn scales(grids: &[usize], strides: &[f32], anchors: &[[[f32; 2]; 3]]) -> Vec<ScaleConfig> {
    grids
      .iter()
      .zip(strides)
      .zip(anchors)
      .map(|((&grid, &stride), anchors)| ScaleConfig {
        grid,
        stride,
        anchors: anchors.to_vec(),
      })
      .collect()
  }

  /// COCO P5 模型（640×640），网络内已完成解码
  pub fn coco_p5() -> Self {
    Self::coco(
      P5_INPUT_SIZE,
      DecodeMode::Fused,
      vec![YOLOV5_FUSED_OUTPUT.to_string()],
    )
  }

  /// COCO P5 模型，三个原始输出
  pub fn coco_p5_raw() -> Self {
    Self::coco(
      P5_INPUT_SIZE,
      DecodeMode::Raw {
        scales: Self::scales(&P5_GRIDS, &P5_STRIDES, &P5_ANCHORS),
      },
      Self::raw_outputs(P5_GRIDS.len()),
    )
  }

  /// COCO P6 模型（1280×1280），网络内已完成解码
  pub fn coco_p6() -> Self {
    Self::coco(
      P6_INPUT_SIZE,
      DecodeMode::Fused,
      vec![YOLOV5_FUSED_OUTPUT.to_string()],
    )
  }

  /// COCO P6 模型，四个原始输出
  pub fn coco_p6_raw() -> Self {
    Self::coco(
      P6_INPUT_SIZE,
      DecodeMode::Raw {
        scales: Self::scales(&P6_GRIDS, &P6_STRIDES, &P6_ANCHORS),
      },
      Self::raw_outputs(P6_GRIDS.len()),
    )
  }

  pub fn preset(name: &str) -> Result<Self, ConfigError> {
    match name {
      "coco-p5" => Ok(Self::coco_p5()),
      "coco-p5-raw" => Ok(Self::coco_p5_raw()),
      "coco-p6" => Ok(Self::coco_p6()),
      "coco-p6-raw" => Ok(Self::coco_p6_raw()),
      _ => Err(ConfigError::UnknownPreset(name.to_string())),
    }
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn num_classes(&self) -> usize {
    self.dimensions.saturating_sub(5)
  }

  /// 检查配置与标签、输出之间的结构一致性
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.width == 0 || self.height == 0 {
      return Err(ConfigError::InvalidInputSize {
        width: self.width,
        height: self.height,
      });
    }

    if self.dimensions <= 5 {
      return Err(ConfigError::InvalidDimensions(self.dimensions));
    }

    if self.labels.len() != self.num_classes() {
      error!(
        "标签数量 {} 与类别数 {} 不一致",
        self.labels.len(),
        self.num_classes()
      );
      return Err(ConfigError::LabelCountMismatch {
        expected: self.num_classes(),
        actual: self.labels.len(),
      });
    }

    if let Some((index, label)) = self
      .labels
      .iter()
      .enumerate()
      .find(|(index, label)| label.id as usize != *index)
    {
      return Err(ConfigError::LabelIdMismatch {
        index,
        id: label.id,
      });
    }

    for (name, value) in [
      ("confidence", self.confidence),
      ("mul_confidence", self.mul_confidence),
      ("overlap", self.overlap),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }

    if self.outputs.is_empty() {
      return Err(ConfigError::NoOutputs);
    }

    if let DecodeMode::Raw { scales } = &self.decode {
      if scales.len() != self.outputs.len() {
        error!(
          "原始输出数量 {} 与尺度数量 {} 不一致",
          self.outputs.len(),
          scales.len()
        );
        return Err(ConfigError::ScaleCountMismatch {
          outputs: self.outputs.len(),
          scales: scales.len(),
        });
      }

      if let Some(index) = scales
        .iter()
        .position(|s| s.grid == 0 || s.anchors.is_empty() || s.stride <= 0.0)
      {
        return Err(ConfigError::EmptyScale(index));
      }
    }

    debug!(
      "模型配置有效: {}x{}, {} 类, {} 个输出",
      self.width,
      self.height,
      self.num_classes(),
      self.outputs.len()
    );
    Ok(())
  }

  fn apply_query(&mut self, url: &Url) -> Result<(), ConfigError> {
    for (key, value) in url.query_pairs() {
      let parse = |value: &str| {
        value.parse::<f32>().map_err(|_| ConfigError::InvalidQuery {
          key: key.to_string(),
          value: value.to_string(),
        })
      };

      match key.as_ref() {
        "confidence" => self.confidence = parse(&value)?,
        "mul_confidence" => self.mul_confidence = parse(&value)?,
        "overlap" => self.overlap = parse(&value)?,
        "outputs" => {
          self.outputs = value
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
        }
        _ => warn!("忽略未知的查询参数: {}={}", key, value),
      }
    }
    Ok(())
  }
}

impl FromUrlWithScheme for ModelConfig {
  const SCHEME: &'static str = "yolov5";
}

impl FromUrl for ModelConfig {
  type Error = ConfigError;

  /// `yolov5://<预设>` 或 `yolov5:///path/to/model.json`，查询参数覆盖阈值与输出名称
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch(format!(
        "模型配置必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut config = match url.host_str() {
      Some(preset) if !preset.is_empty() => {
        info!("使用预设模型配置: {}", preset);
        Self::preset(preset)?
      }
      _ => Self::from_json_file(url.path())?,
    };

    config.apply_query(url)?;
    Ok(config)
  }
}
