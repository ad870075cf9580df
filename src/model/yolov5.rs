// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 检测流水线
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

use std::time::Instant;

use image::RgbImage;
use ndarray::ArrayViewD;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  engine::{EngineOutputs, InferenceEngine},
  frame::RgbNchwTensor,
  input::{InputError, Letterbox, LetterboxGeometry},
  model::{ConfigError, DecodeMode, DetectResult, ModelConfig, decode::decode, nms::suppress},
};

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("模型配置不匹配: {0}")]
  ConfigurationMismatch(#[from] ConfigError),
  #[error("推理结果中缺少输出张量: {0}")]
  MissingOutput(String),
  #[error("输出 {name} 形状不匹配: 期望 {expected}, 实际 {actual}")]
  OutputShapeMismatch {
    name: String,
    expected: usize,
    actual: usize,
  },
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("推理引擎错误: {0}")]
  Engine(Box<dyn std::error::Error + Send + Sync>),
}

pub struct Yolov5Builder {
  config: ModelConfig,
}

impl FromUrl for Yolov5Builder {
  type Error = Yolov5Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Yolov5Builder {
      config: ModelConfig::from_url(url)?,
    })
  }
}

impl From<ModelConfig> for Yolov5Builder {
  fn from(config: ModelConfig) -> Self {
    Yolov5Builder { config }
  }
}

impl Yolov5Builder {
  pub fn new(config: ModelConfig) -> Self {
    Self::from(config)
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.config.confidence = confidence;
    self
  }

  pub fn mul_confidence(mut self, mul_confidence: f32) -> Self {
    self.config.mul_confidence = mul_confidence;
    self
  }

  pub fn overlap(mut self, overlap: f32) -> Self {
    self.config.overlap = overlap;
    self
  }

  pub fn build<E: InferenceEngine>(self, engine: E) -> Result<Yolov5<E>, Yolov5Error> {
    if let Err(e) = self.config.validate() {
      error!("模型配置无效: {}", e);
      return Err(e.into());
    }

    info!(
      "模型输入 {}x{}, 解码方式 {}, 输出 {:?}",
      self.config.width,
      self.config.height,
      match self.config.decode {
        DecodeMode::Fused => "fused",
        DecodeMode::Raw { .. } => "raw",
      },
      self.config.outputs
    );

    Ok(Yolov5 {
      config: self.config,
      engine,
    })
  }
}

/// 信箱缩放 → 张量打包 → 推理 → 解码 → 抑制
pub struct Yolov5<E> {
  config: ModelConfig,
  engine: E,
}

impl<E: InferenceEngine> Yolov5<E> {
  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn preprocess(
    &self,
    image: &RgbImage,
  ) -> Result<(RgbNchwTensor, LetterboxGeometry), Yolov5Error> {
    let letterbox = Letterbox::new(image, self.config.width, self.config.height)?;
    let tensor = RgbNchwTensor::from(&*letterbox.image);
    Ok((tensor, letterbox.geometry))
  }

  /// 按配置声明的顺序取输出，解码并抑制
  pub fn postprocess(
    &self,
    outputs: &EngineOutputs,
    geometry: &LetterboxGeometry,
  ) -> Result<DetectResult<'_>, Yolov5Error> {
    let selected = self
      .config
      .outputs
      .iter()
      .map(|name| {
        outputs
          .get(name)
          .map(|tensor| (name.as_str(), tensor))
          .ok_or_else(|| {
            error!(
              "推理结果中缺少输出 {}, 实际输出: {:?}",
              name,
              outputs.names().collect::<Vec<_>>()
            );
            Yolov5Error::MissingOutput(name.clone())
          })
      })
      .collect::<Result<Vec<(&str, ArrayViewD<'_, f32>)>, _>>()?;

    let now = Instant::now();
    let candidates = decode(&selected, &self.config, geometry)?;
    debug!("解码 {} 个候选，耗时: {:.2?}", candidates.len(), now.elapsed());

    let now = Instant::now();
    let items = suppress(candidates, self.config.overlap);
    debug!("抑制后剩余 {} 个，耗时: {:.2?}", items.len(), now.elapsed());

    Ok(items.into())
  }

  pub fn predict(&self, image: &RgbImage) -> Result<DetectResult<'_>, Yolov5Error> {
    let now = Instant::now();
    let (tensor, geometry) = self.preprocess(image)?;
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    let outputs = self
      .engine
      .infer(&self.config.input_name, &tensor)
      .map_err(|e| Yolov5Error::Engine(Box::new(e)))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let result = self.postprocess(&outputs, &geometry)?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::ReplayEngine;

  #[test]
  fn build_rejects_mismatched_labels() {
    let mut config = ModelConfig::coco_p5();
    config.labels.truncate(10);

    let engine = ReplayEngine::new(EngineOutputs::new());
    assert!(matches!(
      Yolov5Builder::new(config).build(engine),
      Err(Yolov5Error::ConfigurationMismatch(
        ConfigError::LabelCountMismatch { .. }
      ))
    ));
  }

  #[test]
  fn missing_output_is_fatal() {
    let engine = ReplayEngine::new(EngineOutputs::new());
    let model = Yolov5Builder::new(ModelConfig::coco_p5())
      .build(engine)
      .unwrap();
    let image = RgbImage::new(32, 24);

    match model.predict(&image) {
      Err(Yolov5Error::MissingOutput(name)) => assert_eq!(name, "output"),
      other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
    }
  }

  #[test]
  fn zero_size_image_is_an_input_error() {
    let engine = ReplayEngine::new(EngineOutputs::new());
    let model = Yolov5Builder::new(ModelConfig::coco_p5())
      .build(engine)
      .unwrap();

    assert!(matches!(
      model.predict(&RgbImage::new(0, 10)),
      Err(Yolov5Error::Input(InputError::EmptyImage { .. }))
    ));
  }

  #[test]
  fn preprocess_produces_model_sized_tensor() {
    let engine = ReplayEngine::new(EngineOutputs::new());
    let model = Yolov5Builder::from_url(&Url::parse("yolov5://coco-p5").unwrap())
      .unwrap()
      .build(engine)
      .unwrap();

    let (tensor, geometry) = model.preprocess(&RgbImage::new(640, 480)).unwrap();
    assert_eq!(tensor.view().shape(), &[1, 3, 640, 640]);
    assert_eq!(geometry.pad_y, 80.0);
  }
}
