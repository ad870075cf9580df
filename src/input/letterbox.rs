// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/letterbox.rs - 信箱缩放与坐标反映射
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, error};

use crate::{input::InputError, model::BBox};

/// 信箱缩放的几何参数，预处理与坐标反映射共用同一份
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
  /// 缩放比例 = 模型输入 / 原图
  pub gain: f32,
  /// 左侧填充（可为小数）
  pub pad_x: f32,
  /// 上侧填充（可为小数）
  pub pad_y: f32,
  pub source_width: u32,
  pub source_height: u32,
  pub target_width: u32,
  pub target_height: u32,
}

impl LetterboxGeometry {
  pub fn new(
    (source_width, source_height): (u32, u32),
    (target_width, target_height): (u32, u32),
  ) -> Result<Self, InputError> {
    if source_width == 0 || source_height == 0 {
      error!("输入图像尺寸为零: {}x{}", source_width, source_height);
      return Err(InputError::EmptyImage {
        width: source_width,
        height: source_height,
      });
    }
    if target_width == 0 || target_height == 0 {
      error!("模型输入尺寸为零: {}x{}", target_width, target_height);
      return Err(InputError::EmptyTarget {
        width: target_width,
        height: target_height,
      });
    }

    let (w, h) = (source_width as f32, source_height as f32);
    let (x_gain, y_gain) = (target_width as f32 / w, target_height as f32 / h);
    let gain = x_gain.min(y_gain);

    Ok(Self {
      gain,
      pad_x: (target_width as f32 - w * gain) / 2.0,
      pad_y: (target_height as f32 - h * gain) / 2.0,
      source_width,
      source_height,
      target_width,
      target_height,
    })
  }

  pub fn is_identity(&self) -> bool {
    self.source_width == self.target_width && self.source_height == self.target_height
  }

  /// 缩放后内容的尺寸，至少 1 像素，不超过模型输入
  pub fn resized_size(&self) -> (u32, u32) {
    let width = (self.source_width as f32 * self.gain).round() as u32;
    let height = (self.source_height as f32 * self.gain).round() as u32;
    (
      width.clamp(1, self.target_width),
      height.clamp(1, self.target_height),
    )
  }

  /// 缩放内容在画布上的左上角
  pub fn placement(&self) -> (u32, u32) {
    let (width, height) = self.resized_size();
    (
      (self.target_width - width) / 2,
      (self.target_height - height) / 2,
    )
  }

  /// 模型输入空间的 `[x_min, y_min, x_max, y_max]` 映射回原图并裁剪。
  ///
  /// 左上角裁剪到 `[0, size]`，右下角裁剪到 `[0, size - 1]`；
  /// 裁剪后宽或高不为正的框返回 `None`。
  pub fn unmap(&self, xyxy: [f32; 4]) -> Option<BBox> {
    let (w, h) = (self.source_width as f32, self.source_height as f32);

    let x_min = ((xyxy[0] - self.pad_x) / self.gain).clamp(0.0, w);
    let y_min = ((xyxy[1] - self.pad_y) / self.gain).clamp(0.0, h);
    let x_max = ((xyxy[2] - self.pad_x) / self.gain).clamp(0.0, w - 1.0);
    let y_max = ((xyxy[3] - self.pad_y) / self.gain).clamp(0.0, h - 1.0);

    let bbox = BBox::new(x_min, y_min, x_max, y_max);
    (!bbox.is_degenerate()).then_some(bbox)
  }

  /// `unmap` 的逆变换（不裁剪）：原图坐标到模型输入空间
  pub fn map(&self, bbox: &BBox) -> [f32; 4] {
    [
      bbox.x_min * self.gain + self.pad_x,
      bbox.y_min * self.gain + self.pad_y,
      bbox.x_max * self.gain + self.pad_x,
      bbox.y_max * self.gain + self.pad_y,
    ]
  }
}

/// 信箱缩放后的画布；尺寸已经匹配时借用原图
#[derive(Debug, Clone)]
pub struct Letterbox<'a> {
  pub image: Cow<'a, RgbImage>,
  pub geometry: LetterboxGeometry,
}

impl<'a> Letterbox<'a> {
  pub fn new(image: &'a RgbImage, width: u32, height: u32) -> Result<Self, InputError> {
    let geometry = LetterboxGeometry::new(image.dimensions(), (width, height))?;

    if geometry.is_identity() {
      debug!("输入尺寸与模型一致，跳过缩放");
      return Ok(Self {
        image: Cow::Borrowed(image),
        geometry,
      });
    }

    let (resized_width, resized_height) = geometry.resized_size();
    let (x, y) = geometry.placement();
    debug!(
      "信箱缩放: {}x{} -> {}x{}, 偏移 ({}, {}), 比例 {:.4}",
      image.width(),
      image.height(),
      resized_width,
      resized_height,
      x,
      y,
      geometry.gain
    );

    let resized = image::imageops::resize(
      image,
      resized_width,
      resized_height,
      FilterType::Triangle,
    );

    // 黑色画布
    let mut canvas = RgbImage::new(width, height);
    image::imageops::replace(&mut canvas, &resized, i64::from(x), i64::from(y));

    Ok(Self {
      image: Cow::Owned(canvas),
      geometry,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn landscape_image_is_padded_vertically() {
    let geometry = LetterboxGeometry::new((640, 480), (640, 640)).unwrap();

    assert_eq!(geometry.gain, 1.0);
    assert_eq!(geometry.pad_x, 0.0);
    assert_eq!(geometry.pad_y, 80.0);
    assert_eq!(geometry.resized_size(), (640, 480));
    assert_eq!(geometry.placement(), (0, 80));
  }

  #[test]
  fn one_axis_is_filled_and_nothing_is_cropped() {
    for &(w, h) in &[(1920, 1080), (300, 1200), (17, 5), (640, 640), (5000, 3), (1, 1)] {
      let geometry = LetterboxGeometry::new((w, h), (640, 640)).unwrap();
      let (rw, rh) = geometry.resized_size();
      assert!(rw <= 640 && rh <= 640, "{}x{} -> {}x{}", w, h, rw, rh);
      assert!(rw == 640 || rh == 640, "{}x{} -> {}x{}", w, h, rw, rh);
    }
  }

  #[test]
  fn zero_size_image_is_rejected() {
    assert!(matches!(
      LetterboxGeometry::new((0, 480), (640, 640)),
      Err(InputError::EmptyImage { width: 0, height: 480 })
    ));
    let empty = RgbImage::new(0, 0);
    assert!(Letterbox::new(&empty, 640, 640).is_err());
  }

  #[test]
  fn matching_size_skips_resizing() {
    let image = RgbImage::from_pixel(64, 64, Rgb([9, 9, 9]));
    let letterbox = Letterbox::new(&image, 64, 64).unwrap();

    assert!(matches!(letterbox.image, Cow::Borrowed(_)));
    assert_eq!(letterbox.geometry.gain, 1.0);
    assert_eq!(letterbox.geometry.pad_x, 0.0);
    assert_eq!(letterbox.geometry.pad_y, 0.0);
  }

  #[test]
  fn canvas_is_black_outside_content() {
    let image = RgbImage::from_pixel(64, 32, Rgb([200, 100, 50]));
    let letterbox = Letterbox::new(&image, 32, 32).unwrap();
    let canvas = &*letterbox.image;

    assert_eq!(canvas.dimensions(), (32, 32));
    // 内容位于第 8..24 行
    assert_eq!(*canvas.get_pixel(16, 0), Rgb([0, 0, 0]));
    assert_eq!(*canvas.get_pixel(16, 31), Rgb([0, 0, 0]));
    assert_eq!(*canvas.get_pixel(16, 16), Rgb([200, 100, 50]));
  }

  #[test]
  fn unmap_inverts_map() {
    let geometry = LetterboxGeometry::new((1280, 720), (640, 640)).unwrap();
    let bbox = BBox::new(100.0, 50.5, 900.25, 600.0);

    let restored = geometry.unmap(geometry.map(&bbox)).unwrap();
    assert!((restored.x_min - bbox.x_min).abs() < 1e-3);
    assert!((restored.y_min - bbox.y_min).abs() < 1e-3);
    assert!((restored.x_max - bbox.x_max).abs() < 1e-3);
    assert!((restored.y_max - bbox.y_max).abs() < 1e-3);
  }

  #[test]
  fn unmap_clips_asymmetrically() {
    let geometry = LetterboxGeometry::new((100, 100), (100, 100)).unwrap();

    let bbox = geometry.unmap([-20.0, -5.0, 150.0, 130.0]).unwrap();
    assert_eq!(bbox, BBox::new(0.0, 0.0, 99.0, 99.0));

    // 整个框都在右侧之外，裁剪后退化
    assert!(geometry.unmap([120.0, 10.0, 160.0, 40.0]).is_none());
  }
}
