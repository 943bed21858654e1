// 该文件是 Tuwen （图问） 项目的一部分。
// src/task.rs - 任务编排
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
  io::BufRead,
  sync::mpsc::{self, Receiver},
  time::Instant,
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame::{FrameError, PreparedImage, UploadedImage},
  model::{Model, Prompt},
  output::{
    Render,
    draw::{AnnotatedImage, Draw},
  },
  response::{ResponseError, parse_descriptors},
  session::{ChatHistory, ChatTurn},
};

pub const DEFAULT_QUESTION: &str = "Describe this image";

pub const DEFAULT_DETECTION_PROMPT: &str =
  "Detect the 2d bounding boxes of the objects in this image";

pub const DETECTION_SYSTEM_INSTRUCTION: &str = "Return bounding boxes as a JSON array with labels. \
Never return masks or code fencing. Limit to 25 objects. \
If an object is present multiple times, name them according to their unique characteristic \
(colors, size, position, unique characteristics, etc..).";

const DETECTION_TEMPERATURE: f32 = 0.5;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("没有输入图像")]
  NoInput,
  #[error("输入图像无效: {0}")]
  InvalidImage(#[from] FrameError),
  #[error("模型调用失败: {0}")]
  ExternalCallFailure(#[source] BoxedError),
  #[error("模型回复无法解析: {0}")]
  MalformedResponse(String),
  #[error("第 {index} 个检测结果格式错误: {reason}")]
  MalformedDescriptor { index: usize, reason: String },
  #[error("读取问题失败: {0}")]
  QuestionInput(#[from] std::io::Error),
  #[error("输出失败: {0}")]
  OutputFailure(#[source] BoxedError),
}

impl From<ResponseError> for TaskError {
  fn from(err: ResponseError) -> Self {
    match err {
      ResponseError::MalformedResponse(reason) => TaskError::MalformedResponse(reason),
      ResponseError::MalformedDescriptor { index, reason } => {
        TaskError::MalformedDescriptor { index, reason }
      }
    }
  }
}

impl TaskError {
  pub fn external<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    TaskError::ExternalCallFailure(Box::new(err))
  }

  pub fn output<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    TaskError::OutputFailure(Box::new(err))
  }

  /// 展示给用户的错误文本
  pub fn user_message(&self) -> String {
    match self {
      TaskError::ExternalCallFailure(_) => format!("发生错误: {}，请稍后重试", self),
      TaskError::MalformedResponse(_) | TaskError::MalformedDescriptor { .. } => {
        format!("发生错误: {}，可以换一种描述再试一次", self)
      }
      _ => format!("发生错误: {}", self),
    }
  }
}

/// 目标检测：请求模型、清洗并解析回复、绘制检测框
pub struct Detector<M> {
  model: M,
  draw: Draw,
}

impl<M, ME> Detector<M>
where
  M: Model<Input = Prompt, Output = String, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, draw: Draw) -> Self {
    Self { model, draw }
  }

  pub fn detect(&self, frame: &PreparedImage, prompt: &str) -> Result<AnnotatedImage, TaskError> {
    let request = Prompt::single_turn(frame, prompt)
      .with_system_instruction(DETECTION_SYSTEM_INSTRUCTION)
      .with_temperature(DETECTION_TEMPERATURE);

    let raw = self.model.infer(&request).map_err(TaskError::external)?;
    // 全部条目通过校验后才开始绘制
    let descriptors = parse_descriptors(&raw)?;
    info!("检测到 {} 个目标", descriptors.len());

    Ok(self.draw.draw_detection(frame, &descriptors))
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn first_frame<I: Iterator<Item = UploadedImage>>(mut input: I) -> Result<PreparedImage, TaskError> {
  let upload = input.next().ok_or(TaskError::NoInput)?;
  let frame = upload.prepare()?;
  info!(
    "输入图像 {} 准备完成: {}x{}",
    upload.name().unwrap_or("<memory>"),
    frame.width(),
    frame.height()
  );
  Ok(frame)
}

/// 询问一次并输出回答
pub struct OneShotTask {
  question: String,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self {
      question: DEFAULT_QUESTION.to_string(),
    }
  }
}

impl OneShotTask {
  pub fn with_question(mut self, question: impl Into<String>) -> Self {
    self.question = question.into();
    self
  }
}

impl<I, M, ME, O, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = UploadedImage>,
  M: Model<Input = Prompt, Output = String, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<PreparedImage, ChatHistory, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = TaskError;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = first_frame(input)?;

    let mut history = ChatHistory::default();
    let prompt = history.prompt_with(&frame, &self.question);
    let now = Instant::now();
    let answer = model.infer(&prompt).map_err(TaskError::external)?;
    info!("模型回复完成，耗时: {:.2?}", now.elapsed());

    history.push(ChatTurn::user(self.question));
    history.push(ChatTurn::model(answer));
    output
      .render_result(&frame, &history)
      .map_err(TaskError::output)
  }
}

/// 围绕同一张图像的多轮问答，每行输入一个问题
pub struct ChatTask<R> {
  questions: R,
  interrupt: Option<Receiver<()>>,
}

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

impl<R: BufRead> ChatTask<R> {
  pub fn new(questions: R) -> Self {
    Self {
      questions,
      interrupt: None,
    }
  }

  /// Ctrl-C 后在当前一轮结束时退出
  pub fn listen_interrupt(mut self) -> Self {
    let (tx, rx) = mpsc::channel();
    match ctrlc::set_handler(move || {
      info!("收到中断信号，本轮结束后退出...");
      let _ = tx.send(());
    }) {
      Ok(()) => self.interrupt = Some(rx),
      Err(e) => warn!("无法设置 Ctrl-C 处理器: {}", e),
    }
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

impl<R, I, M, ME, O, RE> Task<I, M, O> for ChatTask<R>
where
  R: BufRead,
  I: Iterator<Item = UploadedImage>,
  M: Model<Input = Prompt, Output = String, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<PreparedImage, ChatHistory, Error = RE>
    + Render<PreparedImage, TaskError, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = TaskError;

  fn run_task(mut self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始对话，输入 exit 结束...");
    let frame = first_frame(input)?;
    let mut history = ChatHistory::default();

    let mut line = String::new();
    loop {
      line.clear();
      let read = self.questions.read_line(&mut line)?;
      if read == 0 {
        break;
      }

      let question = line.trim();
      if question.is_empty() {
        continue;
      }
      if EXIT_COMMANDS.contains(&question) {
        break;
      }

      let prompt = history.prompt_with(&frame, question);
      let now = Instant::now();
      match model.infer(&prompt) {
        Ok(answer) => {
          info!("第 {} 轮回复完成，耗时: {:.2?}", history.len() / 2 + 1, now.elapsed());
          history.push(ChatTurn::user(question));
          history.push(ChatTurn::model(answer));
          Render::<PreparedImage, ChatHistory>::render_result(&output, &frame, &history)
            .map_err(TaskError::output)?;
        }
        Err(e) => {
          // 失败的一轮不写入记录
          let err = TaskError::external(e);
          error!("{}", err);
          Render::<PreparedImage, TaskError>::render_result(&output, &frame, &err)
            .map_err(TaskError::output)?;
        }
      }

      if self.interrupted() {
        warn!("中断信号接收，结束对话");
        break;
      }
    }

    info!("对话结束，共 {} 条记录", history.len());
    Ok(())
  }
}

/// 检测图像中的目标并输出标注结果
pub struct DetectTask {
  prompt: String,
  draw: Draw,
}

impl DetectTask {
  pub fn new(draw: Draw) -> Self {
    Self {
      prompt: DEFAULT_DETECTION_PROMPT.to_string(),
      draw,
    }
  }

  pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
    self.prompt = prompt.into();
    self
  }
}

impl<I, M, ME, O, RE> Task<I, M, O> for DetectTask
where
  I: Iterator<Item = UploadedImage>,
  M: Model<Input = Prompt, Output = String, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<PreparedImage, AnnotatedImage, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = TaskError;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始检测任务...");
    let frame = first_frame(input)?;

    let detector = Detector::new(model, self.draw);
    let now = Instant::now();
    let annotated = detector.detect(&frame, &self.prompt)?;
    info!("检测完成，耗时: {:.2?}", now.elapsed());

    output
      .render_result(&frame, &annotated)
      .map_err(TaskError::output)?;
    info!("渲染完成");
    Ok(())
  }
}
