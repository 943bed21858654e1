// 该文件是 Tuwen （图问） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use tuwen::{
  FromUrl,
  input::InputWrapper,
  model::ModelWrapper,
  output::{ConsoleOutput, OutputWrapper, draw::Draw},
  task::{ChatTask, DetectTask, OneShotTask, Task, TaskError},
};

use args::{Args, Command};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model.scheme());
  info!("输入来源: {}", args.input);

  let input = InputWrapper::from_url(&args.input)?;
  let model = ModelWrapper::from_url(&args.model)?;

  let result: Result<(), TaskError> = match args.command {
    Command::Describe { question } => {
      OneShotTask::default()
        .with_question(question)
        .run_task(input, model, ConsoleOutput::stdout())
    }
    Command::Chat => {
      println!("请输入问题（exit 结束）:");
      ChatTask::new(std::io::stdin().lock())
        .listen_interrupt()
        .run_task(input, model, ConsoleOutput::stdout())
    }
    Command::Detect {
      prompt,
      output,
      font,
    } => {
      info!("输出路径: {}", output);
      let output = OutputWrapper::from_url(&output)?;
      let draw = Draw::with_font_file(font.as_deref())?;
      DetectTask::new(draw)
        .with_prompt(prompt)
        .run_task(input, model, output)
    }
  };

  if let Err(e) = result {
    error!("任务失败: {:?}", e);
    eprintln!("{}", e.user_message());
    return Err(e.into());
  }

  info!("处理完成!");
  Ok(())
}
