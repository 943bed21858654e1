// 该文件是 Tuwen （图问） 项目的一部分。
// src/model/gemini.rs - Gemini 托管模型
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

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, query_param,
  model::{Content, Model, Part, Prompt},
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
const VERTEX_PROJECT_ENV: &str = "GCP_PROJECT";
const VERTEX_TOKEN_ENV: &str = "GOOGLE_CLOUD_ACCESS_TOKEN";
const VERTEX_DEFAULT_LOCATION: &str = "us-central1";

#[derive(Error, Debug)]
pub enum GeminiError {
  #[error("模型地址错误: {0}")]
  ModelPathError(String),
  #[error("缺少凭据: {0}")]
  MissingCredential(String),
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("服务端返回错误 {status}: {message}")]
  ServiceError { status: u16, message: String },
  #[error("模型没有返回文本 (finish reason: {0})")]
  EmptyResponse(String),
}

/// 请求发往的服务
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiEndpoint {
  /// Generative Language API，使用 API key
  Api { model: String, api_key: String },
  /// Vertex AI，使用项目与访问令牌
  Vertex {
    project: String,
    location: String,
    model: String,
    access_token: String,
  },
}

impl GeminiEndpoint {
  pub fn generate_url(&self) -> String {
    match self {
      GeminiEndpoint::Api { model, .. } => {
        format!(
          "{}/models/{}:generateContent",
          GEMINI_API_BASE,
          urlencoding::encode(model)
        )
      }
      GeminiEndpoint::Vertex {
        project,
        location,
        model,
        ..
      } => format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{}/locations/{location}/publishers/google/models/{}:generateContent",
        urlencoding::encode(project),
        urlencoding::encode(model),
      ),
    }
  }

  pub fn model(&self) -> &str {
    match self {
      GeminiEndpoint::Api { model, .. } | GeminiEndpoint::Vertex { model, .. } => model,
    }
  }
}

pub struct GeminiBuilder {
  endpoint: GeminiEndpoint,
  temperature: Option<f32>,
}

impl GeminiBuilder {
  pub const SCHEME_API: &'static str = "gemini";
  pub const SCHEME_VERTEX: &'static str = "vertex";
}

fn credential(url: &Url, key: &str, env: &str) -> Option<String> {
  query_param(url, key)
    .or_else(|| std::env::var(env).ok())
    .filter(|value| !value.is_empty())
}

impl FromUrl for GeminiBuilder {
  type Error = GeminiError;

  /// `gemini://<model>?key=...` 或 `vertex://<location>/<model>?project=...&token=...`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let endpoint = match url.scheme() {
      Self::SCHEME_API => {
        let model = url
          .host_str()
          .filter(|host| !host.is_empty())
          .ok_or_else(|| GeminiError::ModelPathError(format!("缺少模型名称: {}", url)))?
          .to_string();
        let api_key = credential(url, "key", GEMINI_API_KEY_ENV).ok_or_else(|| {
          GeminiError::MissingCredential(format!("请设置 {} 或在 URL 中提供 key", GEMINI_API_KEY_ENV))
        })?;
        GeminiEndpoint::Api { model, api_key }
      }
      Self::SCHEME_VERTEX => {
        let location = url
          .host_str()
          .filter(|host| !host.is_empty())
          .unwrap_or(VERTEX_DEFAULT_LOCATION)
          .to_string();
        let model = url.path().trim_matches('/').to_string();
        if model.is_empty() || model.contains('/') {
          return Err(GeminiError::ModelPathError(format!(
            "模型路径必须形如 {}://<location>/<model>: {}",
            Self::SCHEME_VERTEX,
            url
          )));
        }
        let project = credential(url, "project", VERTEX_PROJECT_ENV).ok_or_else(|| {
          GeminiError::MissingCredential(format!("请设置 {} 或在 URL 中提供 project", VERTEX_PROJECT_ENV))
        })?;
        let access_token = credential(url, "token", VERTEX_TOKEN_ENV).ok_or_else(|| {
          GeminiError::MissingCredential(format!("请设置 {} 或在 URL 中提供 token", VERTEX_TOKEN_ENV))
        })?;
        GeminiEndpoint::Vertex {
          project,
          location,
          model,
          access_token,
        }
      }
      other => {
        return Err(GeminiError::ModelPathError(format!(
          "模型路径必须使用 {} 或 {} 方案，实际为 {}",
          Self::SCHEME_API,
          Self::SCHEME_VERTEX,
          other
        )));
      }
    };

    let temperature = query_param(url, "temperature").and_then(|t| t.parse().ok());

    Ok(GeminiBuilder {
      endpoint,
      temperature,
    })
  }
}

impl GeminiBuilder {
  pub fn new(endpoint: GeminiEndpoint) -> Self {
    Self {
      endpoint,
      temperature: None,
    }
  }

  pub fn temperature(mut self, temperature: f32) -> Self {
    self.temperature = Some(temperature);
    self
  }

  pub fn build(self) -> Result<Gemini, GeminiError> {
    info!("连接模型服务: {}", self.endpoint.model());
    // 超时交由服务端决定
    let client = Client::builder().timeout(None::<Duration>).build()?;
    Ok(Gemini {
      client,
      endpoint: self.endpoint,
      temperature: self.temperature,
    })
  }
}

pub struct Gemini {
  client: Client,
  endpoint: GeminiEndpoint,
  temperature: Option<f32>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<SystemInstruction>,
  contents: &'a [Content],
  #[serde(skip_serializing_if = "Option::is_none")]
  generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Debug)]
struct SystemInstruction {
  parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
  content: Option<CandidateContent>,
  finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
  text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
  message: String,
}

impl Gemini {
  fn request_body<'a>(&self, prompt: &'a Prompt) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
      system_instruction: prompt
        .system_instruction
        .as_ref()
        .map(|text| SystemInstruction {
          parts: vec![Part::text(text.as_str())],
        }),
      contents: &prompt.contents,
      generation_config: prompt
        .temperature
        .or(self.temperature)
        .map(|temperature| GenerationConfig { temperature }),
    }
  }
}

/// 拼接第一个候选回复中的所有文本片段
fn extract_text(response: GenerateContentResponse) -> Result<String, GeminiError> {
  let Some(candidate) = response.candidates.into_iter().next() else {
    return Err(GeminiError::EmptyResponse("no candidates".to_string()));
  };

  let text: String = candidate
    .content
    .map(|content| {
      content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect()
    })
    .unwrap_or_default();

  if text.is_empty() {
    return Err(GeminiError::EmptyResponse(
      candidate
        .finish_reason
        .unwrap_or_else(|| "unknown".to_string()),
    ));
  }
  Ok(text)
}

impl Model for Gemini {
  type Input = Prompt;
  type Output = String;
  type Error = GeminiError;

  fn infer(&self, input: &Prompt) -> Result<String, GeminiError> {
    let url = self.endpoint.generate_url();
    debug!("请求模型: {} ({} 条内容)", url, input.contents.len());

    let request = self.client.post(&url).json(&self.request_body(input));
    let request = match &self.endpoint {
      GeminiEndpoint::Api { api_key, .. } => request.header("x-goog-api-key", api_key),
      GeminiEndpoint::Vertex { access_token, .. } => request.bearer_auth(access_token),
    };

    let response = request.send()?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
      error!("模型服务返回错误 {}: {}", status, message);
      return Err(GeminiError::ServiceError {
        status: status.as_u16(),
        message,
      });
    }

    let text = extract_text(response.json::<GenerateContentResponse>()?)?;
    debug!("模型回复 {} 字符", text.chars().count());
    Ok(text)
  }
}
