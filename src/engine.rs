// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use ndarray::{ArrayD, ArrayViewD};

use crate::frame::RgbNchwTensor;

mod replay;
pub use self::replay::{ReplayEngine, ReplayError};

/// 推理引擎：接收一个命名输入张量，返回若干命名输出张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input_name: &str, input: &RgbNchwTensor) -> Result<EngineOutputs, Self::Error>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for &E {
  type Error = E::Error;

  fn infer(&self, input_name: &str, input: &RgbNchwTensor) -> Result<EngineOutputs, Self::Error> {
    (**self).infer(input_name, input)
  }
}

/// 引擎返回的命名输出张量，保持引擎给出的顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutputs {
  tensors: Vec<(String, ArrayD<f32>)>,
}

impl EngineOutputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
    self.tensors.push((name.into(), tensor));
  }

  pub fn with(mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Self {
    self.push(name, tensor);
    self
  }

  /// 按名称取第一个匹配的张量
  pub fn get(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
    self
      .tensors
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, tensor)| tensor.view())
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tensors.iter().map(|(name, _)| name.as_str())
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}

impl FromIterator<(String, ArrayD<f32>)> for EngineOutputs {
  fn from_iter<T: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: T) -> Self {
    Self {
      tensors: iter.into_iter().collect(),
    }
  }
}
