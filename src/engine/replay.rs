// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/replay.rs - 回放已记录的推理输出
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

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::{EngineOutputs, InferenceEngine},
  frame::RgbNchwTensor,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输出 {name} 的形状 {shape:?} 与数据长度 {len} 不一致")]
  ShapeMismatch {
    name: String,
    shape: Vec<usize>,
    len: usize,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordedTensor {
  name: String,
  shape: Vec<usize>,
  data: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Recording {
  outputs: Vec<RecordedTensor>,
}

/// 每次推理都返回同一组已记录输出的引擎
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  outputs: EngineOutputs,
}

impl ReplayEngine {
  pub fn new(outputs: EngineOutputs) -> Self {
    Self { outputs }
  }

  /// 解析 `{"outputs": [{"name", "shape", "data"}]}`
  pub fn from_json_str(text: &str) -> Result<Self, ReplayError> {
    let recording: Recording = serde_json::from_str(text)?;

    let outputs = recording
      .outputs
      .into_iter()
      .map(|tensor| {
        let RecordedTensor { name, shape, data } = tensor;
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(&shape), data)
          .map(|array| (name.clone(), array))
          .map_err(|_| ReplayError::ShapeMismatch { name, shape, len })
      })
      .collect::<Result<EngineOutputs, _>>()?;

    debug!("回放输出: {:?}", outputs.names().collect::<Vec<_>>());
    Ok(Self { outputs })
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
    let path = path.as_ref();
    info!("加载记录的推理输出: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  /// 记录为 JSON，格式与 `from_json_str` 相同
  pub fn to_json_string(&self) -> Result<String, ReplayError> {
    let recording = Recording {
      outputs: self
        .outputs
        .tensors
        .iter()
        .map(|(name, tensor)| RecordedTensor {
          name: name.clone(),
          shape: tensor.shape().to_vec(),
          data: tensor.iter().copied().collect(),
        })
        .collect(),
    };
    Ok(serde_json::to_string(&recording)?)
  }
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::from_json_file(url.path())
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayError;

  fn infer(&self, input_name: &str, input: &RgbNchwTensor) -> Result<EngineOutputs, Self::Error> {
    debug!(
      "回放推理: 输入 {} 形状 {:?}",
      input_name,
      input.view().shape()
    );
    Ok(self.outputs.clone())
  }
}
