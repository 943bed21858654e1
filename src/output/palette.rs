// 该文件是 Tuwen （图问） 项目的一部分。
// src/output/palette.rs - 标注颜色表
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

use image::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
  pub name: &'static str,
  pub rgb: Rgb<u8>,
}

const fn named(name: &'static str, r: u8, g: u8, b: u8) -> NamedColor {
  NamedColor {
    name,
    rgb: Rgb([r, g, b]),
  }
}

pub const DEFAULT_COLORS: [NamedColor; 23] = [
  named("red", 255, 0, 0),
  named("green", 0, 128, 0),
  named("blue", 0, 0, 255),
  named("yellow", 255, 255, 0),
  named("orange", 255, 165, 0),
  named("pink", 255, 192, 203),
  named("purple", 128, 0, 128),
  named("brown", 165, 42, 42),
  named("gray", 128, 128, 128),
  named("beige", 245, 245, 220),
  named("turquoise", 64, 224, 208),
  named("cyan", 0, 255, 255),
  named("magenta", 255, 0, 255),
  named("lime", 0, 255, 0),
  named("navy", 0, 0, 128),
  named("maroon", 128, 0, 0),
  named("teal", 0, 128, 128),
  named("olive", 128, 128, 0),
  named("coral", 255, 127, 80),
  named("lavender", 230, 230, 250),
  named("violet", 238, 130, 238),
  named("gold", 255, 215, 0),
  named("silver", 192, 192, 192),
];

/// 按检测结果下标循环取色，超过颜色数后会重复
#[derive(Debug, Clone)]
pub struct ColorPalette {
  colors: &'static [NamedColor],
}

impl Default for ColorPalette {
  fn default() -> Self {
    Self {
      colors: &DEFAULT_COLORS,
    }
  }
}

impl ColorPalette {
  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  pub fn color_for(&self, index: usize) -> NamedColor {
    self.colors[index % self.colors.len()]
  }
}
