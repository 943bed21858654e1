// 该文件是 Tuwen （图问） 项目的一部分。
// src/response.rs - 模型回复清洗与检测结果解析
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

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const JSON_FENCE_OPEN: &str = "```json";
const FENCE: &str = "```";

/// 归一化坐标网格的边长
pub const NORMALIZED_GRID: i64 = 1000;

/// 请求时要求模型返回的目标数量上限，本地不截断
pub const REQUESTED_MAX_OBJECTS: usize = 25;

#[derive(Error, Debug)]
pub enum ResponseError {
  #[error("模型回复不是合法的 JSON: {0}")]
  MalformedResponse(String),
  #[error("第 {index} 个检测结果格式错误: {reason}")]
  MalformedDescriptor { index: usize, reason: String },
}

impl ResponseError {
  fn descriptor(index: usize, reason: impl Into<String>) -> Self {
    ResponseError::MalformedDescriptor {
      index,
      reason: reason.into(),
    }
  }
}

/// 单个检测目标，`box_2d` 为 `[y1, x1, y2, x2]`，取值在 0..=1000 网格上，端点顺序不可信
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundingBoxDescriptor {
  pub box_2d: [i64; 4],
  pub label: Option<String>,
}

impl BoundingBoxDescriptor {
  pub fn new(box_2d: [i64; 4], label: Option<&str>) -> Self {
    Self {
      box_2d,
      label: label.map(str::to_string),
    }
  }

  fn from_value(index: usize, value: &Value) -> Result<Self, ResponseError> {
    let object = value
      .as_object()
      .ok_or_else(|| ResponseError::descriptor(index, format!("期望对象，实际为 {}", kind_of(value))))?;

    let coords = object
      .get("box_2d")
      .ok_or_else(|| ResponseError::descriptor(index, "缺少 box_2d"))?
      .as_array()
      .ok_or_else(|| ResponseError::descriptor(index, "box_2d 不是数组"))?;
    if coords.len() != 4 {
      return Err(ResponseError::descriptor(
        index,
        format!("box_2d 长度应为 4，实际为 {}", coords.len()),
      ));
    }

    let mut box_2d = [0i64; 4];
    for (slot, coord) in box_2d.iter_mut().zip(coords) {
      *slot = coord
        .as_i64()
        .ok_or_else(|| ResponseError::descriptor(index, format!("box_2d 含非整数值: {}", coord)))?;
    }

    let label = match object.get("label") {
      None | Some(Value::Null) => None,
      Some(Value::String(label)) => Some(label.clone()),
      Some(other) => {
        return Err(ResponseError::descriptor(
          index,
          format!("label 应为字符串，实际为 {}", kind_of(other)),
        ));
      }
    };

    Ok(Self { box_2d, label })
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// 去掉回复外层的 ```json 代码块
///
/// 只识别独占一行、完全等于 ```json 的起始标记；取起始标记之后到下一个 ``` 之前的内容。
/// 多个代码块时只取第一个，缺少结束标记时取到文本末尾。没有起始标记时原样返回。
pub fn strip_json_fence(raw: &str) -> Cow<'_, str> {
  let lines: Vec<&str> = raw.lines().collect();
  match lines.iter().position(|line| *line == JSON_FENCE_OPEN) {
    Some(open) => {
      let body = lines[open + 1..].join("\n");
      let body = match body.split_once(FENCE) {
        Some((inner, _)) => inner.to_string(),
        None => body,
      };
      Cow::Owned(body)
    }
    None => Cow::Borrowed(raw),
  }
}

/// 清洗并解析模型回复；任一条目不合法则整体失败
pub fn parse_descriptors(raw: &str) -> Result<Vec<BoundingBoxDescriptor>, ResponseError> {
  let sanitized = strip_json_fence(raw);
  debug!("清洗后的回复: {}", sanitized);

  let value: Value = serde_json::from_str(&sanitized)
    .map_err(|e| ResponseError::MalformedResponse(e.to_string()))?;
  let items = match value {
    Value::Array(items) => items,
    other => {
      return Err(ResponseError::MalformedResponse(format!(
        "期望 JSON 数组，实际为 {}",
        kind_of(&other)
      )));
    }
  };

  if items.len() > REQUESTED_MAX_OBJECTS {
    warn!(
      "模型返回了 {} 个目标，超过请求的上限 {}",
      items.len(),
      REQUESTED_MAX_OBJECTS
    );
  }

  items
    .iter()
    .enumerate()
    .map(|(index, item)| BoundingBoxDescriptor::from_value(index, item))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fenced_block_is_extracted() {
    let raw = "```json\n[{\"box_2d\": [1, 2, 3, 4], \"label\": \"cup\"}]\n```";
    let stripped = strip_json_fence(raw);
    let expected: Value = serde_json::json!([{ "box_2d": [1, 2, 3, 4], "label": "cup" }]);
    assert_eq!(serde_json::from_str::<Value>(&stripped).unwrap(), expected);
  }

  #[test]
  fn prose_around_fence_is_dropped() {
    let raw = "Here you go:\n```json\n[]\n```\nAnything else?";
    assert_eq!(strip_json_fence(raw), "[]\n");
  }

  #[test]
  fn unfenced_text_passes_through_unchanged() {
    let raw = "  [ {\"box_2d\": [0,0,1,1]} ]\r\n\n";
    assert!(matches!(strip_json_fence(raw), Cow::Borrowed(s) if s == raw));
  }

  #[test]
  fn only_first_block_is_used() {
    let raw = "```json\n[1]\n```\n```json\n[2]\n```";
    assert_eq!(strip_json_fence(raw), "[1]\n");
  }

  #[test]
  fn missing_closing_fence_runs_to_end() {
    let raw = "```json\n[{\"box_2d\": [1, 2, 3, 4]}]";
    assert_eq!(strip_json_fence(raw), "[{\"box_2d\": [1, 2, 3, 4]}]");
  }

  #[test]
  fn other_fence_spellings_are_not_recognised() {
    let raw = "```JSON\n[]\n```";
    assert_eq!(strip_json_fence(raw), raw);
    let raw = "```\n[]\n```";
    assert_eq!(strip_json_fence(raw), raw);
  }

  #[test]
  fn parses_labels_and_unlabelled_boxes() {
    let raw = "```json\n[{\"box_2d\": [500, 100, 900, 300], \"label\": \"cat\"}, {\"box_2d\": [10, 20, 5, 1]}]\n```";
    let descriptors = parse_descriptors(raw).unwrap();
    assert_eq!(
      descriptors,
      vec![
        BoundingBoxDescriptor::new([500, 100, 900, 300], Some("cat")),
        BoundingBoxDescriptor::new([10, 20, 5, 1], None),
      ]
    );
  }

  #[test]
  fn invalid_json_is_malformed_response() {
    assert!(matches!(
      parse_descriptors("I could not find anything."),
      Err(ResponseError::MalformedResponse(_))
    ));
  }

  #[test]
  fn non_array_is_malformed_response() {
    assert!(matches!(
      parse_descriptors("{\"box_2d\": [1, 2, 3, 4]}"),
      Err(ResponseError::MalformedResponse(_))
    ));
  }

  #[test]
  fn missing_box_fails_whole_batch() {
    let raw = "[{\"box_2d\": [1, 2, 3, 4]}, {\"label\": \"dog\"}, {\"box_2d\": [5, 6, 7, 8]}]";
    match parse_descriptors(raw) {
      Err(ResponseError::MalformedDescriptor { index, .. }) => assert_eq!(index, 1),
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn wrong_box_length_is_malformed_descriptor() {
    assert!(matches!(
      parse_descriptors("[{\"box_2d\": [1, 2, 3]}]"),
      Err(ResponseError::MalformedDescriptor { index: 0, .. })
    ));
    assert!(matches!(
      parse_descriptors("[{\"box_2d\": [1, 2, 3, 4, 5]}]"),
      Err(ResponseError::MalformedDescriptor { index: 0, .. })
    ));
  }

  #[test]
  fn non_string_label_is_malformed_descriptor() {
    assert!(matches!(
      parse_descriptors("[{\"box_2d\": [1, 2, 3, 4], \"label\": 7}]"),
      Err(ResponseError::MalformedDescriptor { index: 0, .. })
    ));
  }
}
