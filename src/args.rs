// 该文件是 Tuwen （图问） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use tuwen::task::{DEFAULT_DETECTION_PROMPT, DEFAULT_QUESTION};

/// Tuwen 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// 支持格式:
  /// - gemini://<model>?key=...（或设置 GEMINI_API_KEY）
  /// - vertex://<location>/<model>?project=...&token=...（或设置 GCP_PROJECT 与 GOOGLE_CLOUD_ACCESS_TOKEN）
  #[arg(
    long,
    value_name = "MODEL",
    env = "TUWEN_MODEL",
    default_value = "gemini://gemini-2.0-flash"
  )]
  pub model: Url,

  /// 输入图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 询问一次，默认让模型描述图像
  Describe {
    /// 问题
    #[arg(long, default_value = DEFAULT_QUESTION)]
    question: String,
  },
  /// 从标准输入逐行提问，输入 exit 结束
  Chat,
  /// 检测目标并绘制检测框
  Detect {
    /// 检测提示词
    #[arg(long, default_value = DEFAULT_DETECTION_PROMPT)]
    prompt: String,

    /// 输出路径
    /// 支持格式:
    /// - image:///path/out.png（可加 ?record=true 同时保存 .txt 记录）
    /// - console: 只在终端打印检测框
    #[arg(long, value_name = "OUTPUT")]
    output: Url,

    /// 标签字体文件（TTF/OTF）；未指定时使用内嵌字体
    #[arg(long, value_name = "FILE", env = "TUWEN_FONT")]
    font: Option<PathBuf>,
  },
}
