// 该文件是 Tuwen （图问） 项目的一部分。
// src/output/draw.rs - 检测框投影与标注绘制
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

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Pixel, Rgba};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::PreparedImage,
  output::palette::{ColorPalette, NamedColor},
  response::{BoundingBoxDescriptor, NORMALIZED_GRID},
};

// 绘制常量
const BOX_STROKE_WIDTH: u32 = 4;
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_OFFSET_X: i32 = 8;
const LABEL_OFFSET_Y: i32 = 6;

/// 内嵌的默认标签字体
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {0}: {1}")]
  FontIoError(String, std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 投影到像素空间后的检测框，保证 `x1 <= x2` 且 `y1 <= y2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
  pub x1: i64,
  pub y1: i64,
  pub x2: i64,
  pub y2: i64,
}

fn scale_to(normalized: i64, dimension: u32) -> i64 {
  // 整数除法向零截断；模型可能给出任意大的值，用 i128 计算后饱和到 i64
  let scaled = normalized as i128 * dimension as i128 / NORMALIZED_GRID as i128;
  scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// 将 `[y1, x1, y2, x2]` 归一化坐标映射到 `width` x `height` 的像素坐标
pub fn project(descriptor: &BoundingBoxDescriptor, width: u32, height: u32) -> PixelBox {
  let [y1, x1, y2, x2] = descriptor.box_2d;
  let mut y1 = scale_to(y1, height);
  let mut x1 = scale_to(x1, width);
  let mut y2 = scale_to(y2, height);
  let mut x2 = scale_to(x2, width);

  // 端点顺序在像素空间中纠正
  if x1 > x2 {
    std::mem::swap(&mut x1, &mut x2);
  }
  if y1 > y2 {
    std::mem::swap(&mut y1, &mut y2);
  }

  PixelBox { x1, y1, x2, y2 }
}

/// 一次绘制的记录
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub pixel_box: PixelBox,
  pub color: NamedColor,
  pub label: Option<String>,
  /// 标签文本左上角；未绘制文本时为 None
  pub label_origin: Option<(i32, i32)>,
}

/// 已烧录标注的图像，像素格式与输入一致
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
  pub image: DynamicImage,
  pub annotations: Vec<Annotation>,
}

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  stroke_width: u32,
  label_offset: (i32, i32),
  palette: ColorPalette,
}

impl Default for Draw {
  fn default() -> Self {
    let font = FontArc::try_from_slice(DEFAULT_FONT).expect("无法加载嵌入的字体文件");
    Self::new(font)
  }
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      stroke_width: BOX_STROKE_WIDTH,
      label_offset: (LABEL_OFFSET_X, LABEL_OFFSET_Y),
      palette: ColorPalette::default(),
    }
  }

  pub fn palette(&self) -> &ColorPalette {
    &self.palette
  }

  /// 加载字体文件
  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, DrawError> {
    let path = path.as_ref();
    let data =
      std::fs::read(path).map_err(|e| DrawError::FontIoError(path.display().to_string(), e))?;
    FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.display().to_string()))
  }

  /// 指定字体文件时使用该字体，加载失败即报错；否则使用内嵌字体
  pub fn with_font_file(font: Option<&Path>) -> Result<Self, DrawError> {
    match font {
      Some(path) => {
        info!("加载字体: {}", path.display());
        Ok(Self::new(Self::load_font(path)?))
      }
      None => Ok(Self::default()),
    }
  }

  fn draw_box(&self, image: &mut DynamicImage, pixel_box: &PixelBox, color: Rgba<u8>) {
    // 超出画布的部分不可见，先收缩到画布附近避免 i32 溢出
    let margin = self.stroke_width as i64;
    let clamp_x = |v: i64| v.clamp(-margin, image.width() as i64 + margin);
    let clamp_y = |v: i64| v.clamp(-margin, image.height() as i64 + margin);
    let (x1, x2) = (clamp_x(pixel_box.x1), clamp_x(pixel_box.x2));
    let (y1, y2) = (clamp_y(pixel_box.y1), clamp_y(pixel_box.y2));

    // 线宽向框内延伸
    for t in 0..self.stroke_width as i64 {
      let (left, top, right, bottom) = (x1 + t, y1 + t, x2 - t, y2 - t);
      if left > right || top > bottom {
        break;
      }
      let rect = Rect::at(left as i32, top as i32)
        .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn label_origin(&self, pixel_box: &PixelBox) -> (i32, i32) {
    let x = pixel_box.x1.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    let y = pixel_box.y1.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    (
      x.saturating_add(self.label_offset.0),
      y.saturating_add(self.label_offset.1),
    )
  }

  /// 在图像上绘制全部检测框，颜色按下标循环分配
  pub fn annotate(
    &self,
    image: &mut DynamicImage,
    descriptors: &[BoundingBoxDescriptor],
  ) -> Vec<Annotation> {
    let (width, height) = (image.width(), image.height());
    let mut annotations = Vec::with_capacity(descriptors.len());

    for (index, descriptor) in descriptors.iter().enumerate() {
      let pixel_box = project(descriptor, width, height);
      let color = self.palette.color_for(index);
      let ink = color.rgb.to_rgba();
      self.draw_box(image, &pixel_box, ink);

      let label_origin = descriptor.label.as_deref().map(|label| {
        let (x, y) = self.label_origin(&pixel_box);
        // 起点在画布右下方之外时文字不可见
        if x < width as i32 && y < height as i32 {
          draw_text_mut(image, ink, x, y, self.font_scale, &self.font, label);
        }
        (x, y)
      });

      debug!(
        "绘制目标 {}: {:?} ({}) {:?}",
        index, pixel_box, color.name, descriptor.label
      );

      annotations.push(Annotation {
        pixel_box,
        color,
        label: descriptor.label.clone(),
        label_origin,
      });
    }

    annotations
  }

  /// 复制帧图像并在副本上绘制，原帧不变
  pub fn draw_detection(
    &self,
    frame: &PreparedImage,
    descriptors: &[BoundingBoxDescriptor],
  ) -> AnnotatedImage {
    let mut image = frame.to_canvas();
    let annotations = self.annotate(&mut image, descriptors);
    AnnotatedImage { image, annotations }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage, RgbaImage};

  const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
  const RED: Rgb<u8> = Rgb([255, 0, 0]);

  fn canvas(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, BLACK))
  }

  fn rgb(image: &DynamicImage) -> &RgbImage {
    image.as_rgb8().unwrap()
  }

  #[test]
  fn full_grid_covers_whole_image() {
    let full = BoundingBoxDescriptor::new([0, 0, 1000, 1000], None);
    for (w, h) in [(1, 1), (37, 91), (640, 480), (1920, 1080)] {
      assert_eq!(
        project(&full, w, h),
        PixelBox {
          x1: 0,
          y1: 0,
          x2: w as i64,
          y2: h as i64
        }
      );
    }
  }

  #[test]
  fn projection_truncates_toward_zero() {
    // 570 / 1000 * 100 按整数运算为 57
    let descriptor = BoundingBoxDescriptor::new([570, 333, 999, 1], None);
    let pixel_box = project(&descriptor, 100, 100);
    assert_eq!(pixel_box.y1, 57);
    assert_eq!(pixel_box.x2, 33);
    assert_eq!(pixel_box.y2, 99);
    assert_eq!(pixel_box.x1, 0);
  }

  #[test]
  fn swapped_endpoints_are_reordered() {
    for box_2d in [
      [900, 300, 500, 100],
      [500, 300, 900, 100],
      [900, 100, 500, 300],
      [0, 1000, 1000, 0],
    ] {
      let pixel_box = project(&BoundingBoxDescriptor::new(box_2d, None), 333, 777);
      assert!(pixel_box.x1 <= pixel_box.x2, "{:?}", box_2d);
      assert!(pixel_box.y1 <= pixel_box.y2, "{:?}", box_2d);
    }
  }

  #[test]
  fn worked_example_projects_as_expected() {
    let descriptor = BoundingBoxDescriptor::new([500, 100, 900, 300], Some("cat"));
    assert_eq!(
      project(&descriptor, 400, 1000),
      PixelBox {
        x1: 40,
        y1: 500,
        x2: 120,
        y2: 900
      }
    );
  }

  #[test]
  fn annotate_draws_four_pixel_outline() {
    let mut image = canvas(400, 1000);
    let draw = Draw::default();
    let descriptor = BoundingBoxDescriptor::new([500, 100, 900, 300], None);

    let annotations = draw.annotate(&mut image, &[descriptor]);

    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].color.rgb, RED);
    assert_eq!(annotations[0].label_origin, None);
    let image = rgb(&image);
    for t in 0..4 {
      assert_eq!(*image.get_pixel(40 + t, 700), RED);
      assert_eq!(*image.get_pixel(120 - t, 700), RED);
      assert_eq!(*image.get_pixel(80, 500 + t), RED);
      assert_eq!(*image.get_pixel(80, 900 - t), RED);
    }
    assert_eq!(*image.get_pixel(44, 700), BLACK);
    assert_eq!(*image.get_pixel(80, 700), BLACK);
    assert_eq!(*image.get_pixel(39, 700), BLACK);
  }

  #[test]
  fn label_is_drawn_with_embedded_font() {
    let mut image = canvas(400, 1000);
    let draw = Draw::default();
    let descriptor = BoundingBoxDescriptor::new([500, 100, 900, 300], Some("cat"));

    let annotations = draw.annotate(&mut image, &[descriptor]);

    assert_eq!(annotations[0].label.as_deref(), Some("cat"));
    assert_eq!(annotations[0].label_origin, Some((48, 506)));

    // 框内 (48, 506) 起的区域只应出现红色文字像素
    let image = rgb(&image);
    let mut lit = 0;
    for y in 506..530 {
      for x in 48..100 {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        assert_eq!((g, b), (0, 0), "({}, {})", x, y);
        if r > 0 {
          lit += 1;
        }
      }
    }
    assert!(lit > 10, "label pixels: {}", lit);
    assert_eq!(*image.get_pixel(110, 520), BLACK);
  }

  #[test]
  fn label_origin_is_offset_from_top_left() {
    let draw = Draw::default();
    let pixel_box = PixelBox {
      x1: 40,
      y1: 500,
      x2: 120,
      y2: 900,
    };
    assert_eq!(draw.label_origin(&pixel_box), (48, 506));
  }

  #[test]
  fn colors_follow_descriptor_order() {
    let mut image = canvas(100, 100);
    let draw = Draw::default();
    let len = draw.palette().len();
    let descriptors: Vec<_> = (0..len + 2)
      .map(|_| BoundingBoxDescriptor::new([100, 100, 200, 200], None))
      .collect();

    let annotations = draw.annotate(&mut image, &descriptors);
    assert_eq!(annotations[0].color, annotations[len].color);
    assert_eq!(annotations[1].color, annotations[len + 1].color);
    assert_ne!(annotations[0].color, annotations[1].color);
  }

  #[test]
  fn out_of_range_boxes_do_not_panic() {
    let mut image = canvas(50, 40);
    let draw = Draw::default();
    let descriptors = [
      BoundingBoxDescriptor::new([-5000, -5000, 999_999_999, 999_999_999], Some("huge")),
      BoundingBoxDescriptor::new([1000, 1000, 1000, 1000], None),
    ];
    let annotations = draw.annotate(&mut image, &descriptors);
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[1].pixel_box.x1, 50);
  }

  #[test]
  fn extreme_coordinates_saturate() {
    let descriptor = BoundingBoxDescriptor::new([i64::MAX, i64::MIN, 1, 1], Some("x"));
    let pixel_box = project(&descriptor, 1920, 1920);
    assert_eq!(pixel_box.y2, i64::MAX);
    assert_eq!(pixel_box.x1, i64::MIN);
    assert_eq!((pixel_box.y1, pixel_box.x2), (1, 1));

    let mut image = canvas(64, 48);
    let annotations = Draw::default().annotate(&mut image, &[descriptor]);
    assert!(annotations[0].pixel_box.x1 < i64::from(i32::MIN));
    assert_eq!(annotations[0].label_origin, Some((i32::MIN + 8, 6)));

    let far = BoundingBoxDescriptor::new([i64::MAX, i64::MAX, i64::MAX, i64::MAX], Some("far"));
    let annotations = Draw::default().annotate(&mut image, &[far]);
    assert_eq!(annotations[0].label_origin, Some((i32::MAX, i32::MAX)));
  }

  #[test]
  fn parsed_i64_max_projects_without_overflow() {
    let descriptors = crate::response::parse_descriptors(
      "[{\"box_2d\": [9223372036854775807, 0, 1, 1], \"label\": \"x\"}]",
    )
    .unwrap();
    let pixel_box = project(&descriptors[0], 640, 480);
    assert_eq!(pixel_box.y2, (i64::MAX as i128 * 480 / 1000) as i64);
    assert_eq!((pixel_box.x1, pixel_box.y1, pixel_box.x2), (0, 0, 0));
  }

  #[test]
  fn alpha_channel_survives_annotation() {
    let mut image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 0])));
    let descriptor = BoundingBoxDescriptor::new([0, 0, 500, 500], None);

    Draw::default().annotate(&mut image, &[descriptor]);

    let image = image.as_rgba8().unwrap();
    assert_eq!(*image.get_pixel(0, 10), Rgba([255, 0, 0, 255]));
    assert_eq!(*image.get_pixel(30, 30), Rgba([0, 0, 0, 0]));
  }

  #[test]
  fn explicit_font_file_must_load() {
    let path = Path::new("/nonexistent/tuwen/font.ttf");
    assert!(matches!(
      Draw::with_font_file(Some(path)),
      Err(DrawError::FontIoError(_, _))
    ));
    assert!(Draw::with_font_file(None).is_ok());
  }
}
