//! 响应解析服务 - 业务能力层
//!
//! 只负责"从模型回复中取出 ```json 代码块并解码"，不校验取值

use crate::error::ParseError;
use crate::models::{AnnotationRecord, ErrorRecord};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;
use tracing::debug;

/// ```json 起始标记（不区分大小写）
static OPEN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```[ \t]*json[ \t]*\r?\n").expect("静态正则"));

/// `}` 或 `]` 前多余的逗号
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("静态正则"));

/// 响应解析器
pub struct ResponseParser;

impl ResponseParser {
    /// 解析模型回复
    ///
    /// 失败时返回的 `ErrorRecord` 保留原始回复
    pub fn parse(raw: &str) -> Result<AnnotationRecord, ErrorRecord> {
        Self::try_parse(raw).map_err(|e| ErrorRecord::parse(e.to_string(), raw))
    }

    /// 解析模型回复，返回具体的解析错误
    pub fn try_parse(raw: &str) -> Result<AnnotationRecord, ParseError> {
        let block = extract_block(raw).ok_or(ParseError::MissingBlock)?;
        let value = decode_lenient(block)?;
        match value {
            JsonValue::Object(object) => AnnotationRecord::from_object(object),
            _ => Err(ParseError::NotAnObject),
        }
    }
}

/// 取出第一个 ```json 代码块的内容
///
/// 缺少结束标记时（输出被截断）取剩余全部文本
fn extract_block(raw: &str) -> Option<&str> {
    let open = OPEN_FENCE.find(raw)?;
    let rest = &raw[open.end()..];
    let block = match rest.find("```") {
        Some(end) => &rest[..end],
        None => {
            debug!("代码块缺少结束标记，使用剩余全部内容");
            rest
        }
    };
    Some(block.trim())
}

/// 先严格解码；失败后去掉多余逗号再试一次
fn decode_lenient(block: &str) -> Result<JsonValue, ParseError> {
    match serde_json::from_str(block) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let cleaned = TRAILING_COMMA.replace_all(block, "$1");
            if cleaned == block {
                return Err(strict_err.into());
            }
            debug!("严格解码失败，去掉多余逗号后重试: {}", strict_err);
            serde_json::from_str(&cleaned).map_err(|_| strict_err.into())
        }
    }
}
