// 该文件是 Tuwen （图问） 项目的一部分。
// src/session.rs - 对话记录
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

use std::fmt::Write as _;

use chrono::{DateTime, Local};

use crate::{
  frame::PreparedImage,
  model::{Content, Part, Prompt, Role},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
  pub role: Role,
  pub text: String,
  pub at: DateTime<Local>,
}

impl ChatTurn {
  pub fn user(text: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      text: text.into(),
      at: Local::now(),
    }
  }

  pub fn model(text: impl Into<String>) -> Self {
    Self {
      role: Role::Model,
      text: text.into(),
      at: Local::now(),
    }
  }
}

/// 单个会话内只追加的对话记录
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
  turns: Vec<ChatTurn>,
}

impl ChatHistory {
  pub fn push(&mut self, turn: ChatTurn) {
    self.turns.push(turn);
  }

  pub fn turns(&self) -> &[ChatTurn] {
    &self.turns
  }

  pub fn len(&self) -> usize {
    self.turns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.turns.is_empty()
  }

  /// 以当前记录加上新问题组成请求；图像附在第一条用户消息上
  pub fn prompt_with(&self, image: &PreparedImage, question: &str) -> Prompt {
    let mut contents = Vec::with_capacity(self.turns.len() + 1);
    let mut image_part = Some(Part::image(image));

    let pending = ChatTurn::user(question);
    for turn in self.turns.iter().chain(std::iter::once(&pending)) {
      let content = match turn.role {
        Role::User => {
          let mut parts = Vec::with_capacity(2);
          if let Some(part) = image_part.take() {
            parts.push(part);
          }
          parts.push(Part::text(turn.text.as_str()));
          Content::user(parts)
        }
        Role::Model => Content::model(turn.text.as_str()),
      };
      contents.push(content);
    }

    Prompt {
      contents,
      ..Default::default()
    }
  }

  /// 完整的文本记录，重复调用结果一致
  pub fn transcript(&self) -> String {
    let mut out = String::new();
    for turn in &self.turns {
      let who = match turn.role {
        Role::User => "用户",
        Role::Model => "模型",
      };
      let _ = writeln!(out, "[{}] {}: {}", turn.at.format("%H:%M:%S"), who, turn.text);
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{DynamicImage, RgbImage};

  fn frame() -> PreparedImage {
    PreparedImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), 640).unwrap()
  }

  #[test]
  fn first_prompt_carries_image() {
    let history = ChatHistory::default();
    let prompt = history.prompt_with(&frame(), "Describe this image");
    assert_eq!(prompt.contents.len(), 1);
    assert_eq!(prompt.contents[0].parts.len(), 2);
    assert!(matches!(prompt.contents[0].parts[0], Part::Inline { .. }));
    assert_eq!(prompt.contents[0].parts[1].as_text(), Some("Describe this image"));
  }

  #[test]
  fn follow_up_replays_history_once_with_image() {
    let mut history = ChatHistory::default();
    history.push(ChatTurn::user("What animal is this?"));
    history.push(ChatTurn::model("A cat."));

    let prompt = history.prompt_with(&frame(), "What colour is it?");
    let roles: Vec<_> = prompt.contents.iter().map(|c| c.role).collect();
    assert_eq!(roles, [Role::User, Role::Model, Role::User]);
    let images = prompt
      .contents
      .iter()
      .flat_map(|c| c.parts.iter())
      .filter(|p| matches!(p, Part::Inline { .. }))
      .count();
    assert_eq!(images, 1);
    assert_eq!(prompt.contents[2].parts[0].as_text(), Some("What colour is it?"));
    // 构造请求不会修改记录
    assert_eq!(history.len(), 2);
  }

  #[test]
  fn transcript_is_stable() {
    let mut history = ChatHistory::default();
    history.push(ChatTurn::user("hi"));
    history.push(ChatTurn::model("hello"));
    let first = history.transcript();
    assert_eq!(first, history.transcript());
    assert_eq!(first.lines().count(), 2);
    assert!(first.lines().next().unwrap().ends_with("用户: hi"));
  }
}
