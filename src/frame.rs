// 该文件是 Tuwen （图问） 项目的一部分。
// src/frame.rs - 图像帧定义
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

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

/// 发送给模型前图像长边的上限
pub const THUMBNAIL_MAX_EDGE: u32 = 640;

const JPEG_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像解码错误: {0}")]
  DecodeError(image::ImageError),
  #[error("图像编码错误: {0}")]
  EncodeError(image::ImageError),
  #[error("图像尺寸无效: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 用户上传的原始图像字节
#[derive(Debug, Clone)]
pub struct UploadedImage {
  name: Option<String>,
  bytes: Box<[u8]>,
}

impl From<Vec<u8>> for UploadedImage {
  fn from(bytes: Vec<u8>) -> Self {
    Self {
      name: None,
      bytes: bytes.into_boxed_slice(),
    }
  }
}

impl UploadedImage {
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// 解码并缩放为发送给模型的图像
  pub fn prepare(&self) -> Result<PreparedImage, FrameError> {
    self.prepare_with_max_edge(THUMBNAIL_MAX_EDGE)
  }

  pub fn prepare_with_max_edge(&self, max_edge: u32) -> Result<PreparedImage, FrameError> {
    let decoded = image::load_from_memory(&self.bytes).map_err(FrameError::DecodeError)?;
    PreparedImage::from_dynamic(decoded, max_edge)
  }
}

/// 缩放后的图像（保留原像素格式），以及实际发送给模型的编码数据
#[derive(Debug, Clone)]
pub struct PreparedImage {
  image: DynamicImage,
  encoded: Box<[u8]>,
  mime_type: &'static str,
}

impl PreparedImage {
  pub fn from_dynamic(image: DynamicImage, max_edge: u32) -> Result<Self, FrameError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyImage(width, height));
    }

    let (new_width, new_height) = thumbnail_dimensions(width, height, max_edge);
    let image = if (new_width, new_height) != (width, height) {
      debug!(
        "缩放图像: {}x{} -> {}x{}",
        width, height, new_width, new_height
      );
      image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    } else {
      image
    };

    // JPEG 不支持透明通道，只有发送给模型的副本转为 RGB
    let mut encoded = Cursor::new(Vec::new());
    image
      .to_rgb8()
      .write_to(&mut encoded, ImageFormat::Jpeg)
      .map_err(FrameError::EncodeError)?;

    Ok(Self {
      image,
      encoded: encoded.into_inner().into_boxed_slice(),
      mime_type: JPEG_MIME,
    })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &DynamicImage {
    &self.image
  }

  /// 复制一份可供标注的图像，原图保持不变
  pub fn to_canvas(&self) -> DynamicImage {
    self.image.clone()
  }

  pub fn encoded(&self) -> &[u8] {
    &self.encoded
  }

  pub fn mime_type(&self) -> &'static str {
    self.mime_type
  }
}

/// 计算保持宽高比、长边不超过 `max_edge` 的尺寸；不放大
pub fn thumbnail_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
  let long = width.max(height);
  if long <= max_edge || max_edge == 0 {
    return (width, height);
  }

  let scale = |side: u32| -> u32 {
    let scaled = (side as u64 * max_edge as u64 + long as u64 / 2) / long as u64;
    (scaled as u32).max(1)
  };

  if width >= height {
    (max_edge, scale(height))
  } else {
    (scale(width), max_edge)
  }
}
