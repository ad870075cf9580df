// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::Detection;

/// 贪心非极大值抑制，不区分类别。
///
/// 按输入顺序逐个取 `item`，与所有仍存活的 `current` 比较：
/// 重叠 `>= overlap` 且 `item.score >= current.score` 时移除 `current`。
/// 已被移除的 `item` 仍然参与比较，分数相同的一对框会互相移除，
/// 因此结果依赖输入顺序，必须顺序执行。不相交的框之间从不抑制。
pub fn suppress<'a>(items: Vec<Detection<'a>>, overlap: f32) -> Vec<Detection<'a>> {
  let mut alive = vec![true; items.len()];

  for (i, item) in items.iter().enumerate() {
    for (j, current) in items.iter().enumerate() {
      if i == j || !alive[j] {
        continue;
      }

      if item.bbox.intersection_area(&current.bbox) <= 0.0 {
        continue;
      }

      if item.bbox.iou(&current.bbox) >= overlap && item.score >= current.score {
        alive[j] = false;
      }
    }
  }

  let before = items.len();
  let kept: Vec<_> = items
    .into_iter()
    .zip(alive)
    .filter_map(|(item, alive)| alive.then_some(item))
    .collect();

  debug!("非极大值抑制: {} -> {}", before, kept.len());
  kept
}
