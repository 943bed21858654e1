// 该文件是 Tuwen （图问） 项目的一部分。
// src/model/prompt.rs - 请求内容定义
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

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::frame::PreparedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
  #[serde(rename_all = "camelCase")]
  Inline { inline_data: InlineData },
  Text { text: String },
}

impl Part {
  pub fn text(text: impl Into<String>) -> Self {
    Part::Text { text: text.into() }
  }

  /// 图像以 base64 内联
  pub fn image(image: &PreparedImage) -> Self {
    Part::Inline {
      inline_data: InlineData {
        mime_type: image.mime_type().to_string(),
        data: general_purpose::STANDARD.encode(image.encoded()),
      },
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Part::Text { text } => Some(text),
      Part::Inline { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
  pub role: Role,
  pub parts: Vec<Part>,
}

impl Content {
  pub fn user(parts: Vec<Part>) -> Self {
    Self {
      role: Role::User,
      parts,
    }
  }

  pub fn model(text: impl Into<String>) -> Self {
    Self {
      role: Role::Model,
      parts: vec![Part::text(text)],
    }
  }
}

/// 一次模型调用的完整输入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
  pub system_instruction: Option<String>,
  pub contents: Vec<Content>,
  pub temperature: Option<f32>,
}

impl Prompt {
  /// 单轮请求：图像 + 文本
  pub fn single_turn(image: &PreparedImage, text: impl Into<String>) -> Self {
    Self {
      contents: vec![Content::user(vec![Part::image(image), Part::text(text)])],
      ..Default::default()
    }
  }

  pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
    self.system_instruction = Some(instruction.into());
    self
  }

  pub fn with_temperature(mut self, temperature: f32) -> Self {
    self.temperature = Some(temperature);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parts_serialize_in_wire_shape() {
    let inline = Part::Inline {
      inline_data: InlineData {
        mime_type: "image/jpeg".to_string(),
        data: "AAAA".to_string(),
      },
    };
    let json = serde_json::to_value(Content::user(vec![inline, Part::text("hi")])).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "role": "user",
        "parts": [
          { "inlineData": { "mimeType": "image/jpeg", "data": "AAAA" } },
          { "text": "hi" }
        ]
      })
    );
  }

  #[test]
  fn model_reply_deserializes_as_text() {
    let content: Content =
      serde_json::from_str(r#"{"role":"model","parts":[{"text":"a cat"}]}"#).unwrap();
    assert_eq!(content.role, Role::Model);
    assert_eq!(content.parts[0].as_text(), Some("a cat"));
  }
}
