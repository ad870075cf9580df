// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::model::{DetectResult, Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_OFFSET_X: i32 = -3;
const LABEL_OFFSET_Y: i32 = -23;
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法解析字体文件")]
  InvalidFont,
}

/// 在原图上绘制检测框；设置字体后附带 `名称 (分数)` 文本
#[derive(Default)]
pub struct Draw {
  font: Option<FontVec>,
}

impl Draw {
  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file<P: AsRef<Path>>(self, path: P) -> Result<Self, DrawError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data).map_err(|_| DrawError::InvalidFont)?;
    Ok(self.with_font(font))
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult<'_>) {
    for item in result.iter() {
      self.draw_detection(image, item);
    }
  }

  fn draw_detection(&self, image: &mut RgbImage, item: &Detection<'_>) {
    let color = Rgb(item.label.color);
    let left = item.bbox.x_min.floor() as i32;
    let top = item.bbox.y_min.floor() as i32;
    let right = item.bbox.x_max.ceil() as i32;
    let bottom = item.bbox.y_max.ceil() as i32;

    // 边框向内加粗
    for inset in 0..BOX_THICKNESS {
      let width = right - left - 2 * inset + 1;
      let height = bottom - top - 2 * inset + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if let Some(font) = &self.font {
      let text = format!("{} ({:.2})", item.label.name, item.score);
      draw_text_mut(
        image,
        color,
        left + LABEL_OFFSET_X,
        top + LABEL_OFFSET_Y,
        PxScale::from(LABEL_FONT_SIZE),
        font,
        &text,
      );
    }
  }
}
