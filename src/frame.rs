// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NCHW 浮点张量
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

use image::RgbImage;
use ndarray::{Array4, ArrayView4, Axis, Zip};

const RGB_CHANNELS: usize = 3;
const PIXEL_SCALE: f32 = 255.0;

/// 形状为 `[1, 3, H, W]` 的归一化 RGB 张量，通道顺序固定为 R、G、B
#[derive(Debug, Clone, PartialEq)]
pub struct RgbNchwTensor {
  data: Array4<f32>,
}

impl RgbNchwTensor {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      data: Array4::zeros((1, RGB_CHANNELS, height, width)),
    }
  }

  pub fn height(&self) -> usize {
    self.data.shape()[2]
  }

  pub fn width(&self) -> usize {
    self.data.shape()[3]
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn view(&self) -> ArrayView4<'_, f32> {
    self.data.view()
  }

  pub fn into_array(self) -> Array4<f32> {
    self.data
  }
}

impl From<&RgbImage> for RgbNchwTensor {
  /// `tensor[0, c, y, x] = pixel(x, y)[c] / 255`，每个像素互不依赖
  fn from(image: &RgbImage) -> Self {
    let mut tensor = {
      let (width, height) = image.dimensions();
      RgbNchwTensor::with_shape(height as usize, width as usize)
    };

    let mut batch = tensor.data.index_axis_mut(Axis(0), 0);
    for (c, plane) in batch.outer_iter_mut().enumerate() {
      let fill = |(y, x): (usize, usize), value: &mut f32| {
        *value = f32::from(image.get_pixel(x as u32, y as u32)[c]) / PIXEL_SCALE;
      };

      #[cfg(feature = "parallel")]
      Zip::indexed(plane).par_for_each(fill);
      #[cfg(not(feature = "parallel"))]
      Zip::indexed(plane).for_each(fill);
    }

    tensor
  }
}

impl From<RgbImage> for RgbNchwTensor {
  fn from(image: RgbImage) -> Self {
    RgbNchwTensor::from(&image)
  }
}
