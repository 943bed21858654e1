// 该文件是 Tuwen （图问） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path, frame::UploadedImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Unsupported image type: {0}")]
  UnsupportedType(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 从本地文件读取上传图像，迭代一次后耗尽
pub struct ImageFileInput {
  image: Option<UploadedImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(decoded_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| ext.to_ascii_lowercase())
      .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
      return Err(ImageFileInputError::UnsupportedType(
        path.display().to_string(),
      ));
    }

    let bytes = std::fs::read(path)?;
    info!("读取图像文件: {} ({} 字节)", path.display(), bytes.len());

    let mut image = UploadedImage::from(bytes);
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
      image = image.with_name(name);
    }

    Ok(Self { image: Some(image) })
  }
}

impl Iterator for ImageFileInput {
  type Item = UploadedImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("video:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }

  #[test]
  fn rejects_unsupported_extension() {
    let url = Url::parse("image:///tmp/clip.gif").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::UnsupportedType(_))
    ));
  }

  #[test]
  fn yields_file_once() {
    let path = std::env::temp_dir().join(format!("tuwen input {}.png", std::process::id()));
    std::fs::write(&path, b"\x89PNG fake").unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    let first = input.next().unwrap();
    assert_eq!(first.bytes(), b"\x89PNG fake");
    assert!(first.name().unwrap().starts_with("tuwen input"));
    assert!(input.next().is_none());

    std::fs::remove_file(&path).unwrap();
  }
}
