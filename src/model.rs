// 该文件是 Tuwen （图问） 项目的一部分。
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

use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 远端模型调用接口
///
/// 推理全部交给托管模型完成，本地只负责组织请求与读取文本回复。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (*self).infer(input)
  }
}

mod prompt;
pub use self::prompt::{Content, InlineData, Part, Prompt, Role};

mod gemini;
pub use self::gemini::{Gemini, GeminiBuilder, GeminiEndpoint, GeminiError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("Gemini 错误: {0}")]
  GeminiError(#[from] GeminiError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择模型后端
pub enum ModelWrapper {
  Gemini(Gemini),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      GeminiBuilder::SCHEME_API | GeminiBuilder::SCHEME_VERTEX => {
        let model = GeminiBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Gemini(model))
      }
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for ModelWrapper {
  type Input = Prompt;
  type Output = String;
  type Error = ModelError;

  fn infer(&self, input: &Prompt) -> Result<String, ModelError> {
    match self {
      ModelWrapper::Gemini(model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
