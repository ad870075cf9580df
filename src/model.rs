// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

/// 类别标签，由模型配置持有
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
  pub id: u32,
  pub name: String,
  #[serde(default = "Label::default_color")]
  pub color: [u8; 3],
}

impl Label {
  pub fn new(id: u32, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
      color: Self::default_color(),
    }
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  fn default_color() -> [u8; 3] {
    [0xFF, 0xFF, 0x00]
  }
}

/// 原图像素坐标下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl BBox {
  pub const fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  /// 中心点 + 宽高 转为 角点
  pub fn xywh_to_xyxy([cx, cy, w, h]: [f32; 4]) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
  }

  pub fn width(&self) -> f32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> f32 {
    self.y_max - self.y_min
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn is_degenerate(&self) -> bool {
    !(self.width() > 0.0 && self.height() > 0.0)
  }

  /// 交集面积，不相交时为 0
  pub fn intersection_area(&self, other: &BBox) -> f32 {
    let width = self.x_max.min(other.x_max) - self.x_min.max(other.x_min);
    let height = self.y_max.min(other.y_max) - self.y_min.max(other.y_min);
    width.max(0.0) * height.max(0.0)
  }

  /// 交并比
  pub fn iou(&self, other: &BBox) -> f32 {
    let intersection = self.intersection_area(other);
    let union = self.area() + other.area() - intersection;
    intersection / union
  }
}

/// 单个检测结果，标签借用自模型配置
#[derive(Debug, Clone, PartialEq)]
pub struct Detection<'a> {
  pub label: &'a Label,
  pub score: f32,
  pub bbox: BBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult<'a> {
  pub items: Box<[Detection<'a>]>,
}

impl<'a> DetectResult<'a> {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection<'a>> {
    self.items.iter()
  }
}

impl<'a> From<Vec<Detection<'a>>> for DetectResult<'a> {
  fn from(items: Vec<Detection<'a>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod config;
pub mod decode;
mod labels;
pub mod nms;
mod yolov5;

pub use self::config::{ConfigError, DecodeMode, ModelConfig, ScaleConfig};
pub use self::labels::COCO_CLASSES;
pub use self::yolov5::{Yolov5, Yolov5Builder, Yolov5Error};
