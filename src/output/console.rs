// 该文件是 Tuwen （图问） 项目的一部分。
// src/output/console.rs - 终端文本输出
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

use std::{
  cell::RefCell,
  io::{Stdout, Write},
};

use crate::{
  frame::PreparedImage,
  output::{Render, draw::AnnotatedImage},
  session::ChatHistory,
  task::TaskError,
};

/// 把回答与对话记录写到终端（或任意 `Write`）
pub struct ConsoleOutput<W: Write = Stdout> {
  writer: RefCell<W>,
}

impl ConsoleOutput<Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl Default for ConsoleOutput<Stdout> {
  fn default() -> Self {
    Self::stdout()
  }
}

impl<W: Write> ConsoleOutput<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer: RefCell::new(writer),
    }
  }

  pub fn into_inner(self) -> W {
    self.writer.into_inner()
  }

  fn write_text(&self, text: &str) -> Result<(), std::io::Error> {
    let mut writer = self.writer.borrow_mut();
    writeln!(writer, "{}", text)?;
    writer.flush()
  }
}

/// 每次交互后整体重绘对话记录
impl<W: Write> Render<PreparedImage, ChatHistory> for ConsoleOutput<W> {
  type Error = std::io::Error;

  fn render_result(&self, frame: &PreparedImage, result: &ChatHistory) -> Result<(), Self::Error> {
    let header = format!("[图像 {}x{}]", frame.width(), frame.height());
    self.write_text(&header)?;
    self.write_text(&result.transcript())
  }
}

/// 失败的一轮只展示错误，不改动对话记录
impl<W: Write> Render<PreparedImage, TaskError> for ConsoleOutput<W> {
  type Error = std::io::Error;

  fn render_result(&self, _frame: &PreparedImage, result: &TaskError) -> Result<(), Self::Error> {
    self.write_text(&result.user_message())
  }
}

impl<W: Write> Render<PreparedImage, AnnotatedImage> for ConsoleOutput<W> {
  type Error = std::io::Error;

  fn render_result(&self, _frame: &PreparedImage, result: &AnnotatedImage) -> Result<(), Self::Error> {
    for annotation in &result.annotations {
      let b = &annotation.pixel_box;
      self.write_text(&format!(
        "{} [{}] ({}, {}) - ({}, {})",
        annotation.label.as_deref().unwrap_or("-"),
        annotation.color.name,
        b.x1,
        b.y1,
        b.x2,
        b.y2
      ))?;
    }
    Ok(())
  }
}
