// 该文件是 Tuwen （图问） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::PreparedImage,
  output::{
    Render,
    draw::{AnnotatedImage, Annotation},
  },
  query_param,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  record: Option<Record>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  /// `image:///path/out.png?record=true&label_with_name=false`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let flag = |key: &str, default: bool| {
      query_param(uri, key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
    };
    let record = flag("record", false).then(|| Record {
      label_with_name: flag("label_with_name", true),
    });

    Ok(SaveImageFileOutput::new(decoded_path(uri)).with_record(record))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      record: None,
    }
  }

  pub fn with_record(mut self, record: Option<Record>) -> Self {
    self.record = record;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &DynamicImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    // JPEG 无法保存透明通道
    let is_jpeg = matches!(ImageFormat::from_path(&self.path), Ok(ImageFormat::Jpeg));
    if is_jpeg && image.color().has_alpha() {
      warn!("JPEG 不支持透明通道，保存时丢弃");
      DynamicImage::ImageRgb8(image.to_rgb8()).save(&self.path)?;
    } else {
      image.save(&self.path)?;
    }

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<PreparedImage, AnnotatedImage> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    _frame: &PreparedImage,
    result: &AnnotatedImage,
  ) -> Result<(), Self::Error> {
    if result.annotations.is_empty() {
      warn!("没有检测到目标，保存未标注的图像");
    }
    self.save_image(&result.image)?;
    if let Some(record) = &self.record {
      record.record(&result.annotations, &self.path)?;
    }
    Ok(())
  }
}

/// 以文本形式记录像素坐标，每行 `label, x1, y1, x2, y2`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, annotations: &[Annotation]) -> String {
    let mut records = Vec::with_capacity(annotations.len());
    for (index, item) in annotations.iter().enumerate() {
      let name = match (&item.label, self.label_with_name) {
        (Some(label), true) => label.clone(),
        _ => format!("{}", index),
      };
      let b = &item.pixel_box;
      records.push(format!("{}, {}, {}, {}, {}", name, b.x1, b.y1, b.x2, b.y2));
    }
    records.join("\n")
  }

  pub fn record(&self, annotations: &[Annotation], path: &Path) -> Result<(), std::io::Error> {
    let path = path.with_extension("txt");
    std::fs::write(&path, self.format(annotations))?;
    info!("保存检测记录: {}", path.display());
    Ok(())
  }
}
