use crate::config::ReprocessPolicy;
use crate::models::annotation::AnnotationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Display;

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// 网络 / 超时 / 响应结构不符，重试耗尽
    Transport,
    /// 收到响应但无法解析出结果
    Parse,
    /// 图片文件读取失败
    Input,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Parse => "parse",
            ErrorKind::Input => "input",
        };
        f.write_str(name)
    }
}

/// 一张图片的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ErrorRecordRepr", into = "ErrorRecordRepr")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    /// 解析失败时保留原始响应，便于人工检查
    pub raw_response: Option<String>,
}

impl ErrorRecord {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn parse(message: impl Into<String>, raw_response: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            raw_response: Some(raw_response.into()),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Input,
            message: message.into(),
            raw_response: None,
        }
    }
}

/// 结果文件中的失败记录格式
///
/// 旧文件只有 `error`（解析失败时还有 `original_content`），没有 `kind`
#[derive(Serialize, Deserialize)]
struct ErrorRecordRepr {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_content: Option<String>,
}

impl From<ErrorRecordRepr> for ErrorRecord {
    fn from(repr: ErrorRecordRepr) -> Self {
        let kind = repr.kind.unwrap_or(if repr.original_content.is_some() {
            ErrorKind::Parse
        } else {
            ErrorKind::Transport
        });
        Self {
            kind,
            message: repr.error,
            raw_response: repr.original_content,
        }
    }
}

impl From<ErrorRecord> for ErrorRecordRepr {
    fn from(record: ErrorRecord) -> Self {
        Self {
            error: record.message,
            kind: Some(record.kind),
            original_content: record.raw_response,
        }
    }
}

/// 结果文件中一张图片的条目：成功记录或失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StoredEntry {
    Failure(ErrorRecord),
    Success(AnnotationRecord),
}

impl StoredEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, StoredEntry::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            StoredEntry::Failure(record) => Some(record.kind),
            StoredEntry::Success(_) => None,
        }
    }

    /// 下一次运行时是否需要重新请求
    pub fn needs_reprocess(&self, policy: &ReprocessPolicy) -> bool {
        match self.error_kind() {
            None => false,
            Some(ErrorKind::Transport) => policy.retry_transport_failures,
            Some(ErrorKind::Parse) => policy.retry_parse_failures,
            Some(ErrorKind::Input) => policy.retry_input_failures,
        }
    }
}

impl TryFrom<JsonValue> for StoredEntry {
    type Error = serde_json::Error;

    /// 含 `error` 键的对象视为失败记录，其余按标注结果解析
    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        if value.get("error").is_some() {
            serde_json::from_value(value).map(StoredEntry::Failure)
        } else {
            serde_json::from_value(value).map(StoredEntry::Success)
        }
    }
}

impl From<AnnotationRecord> for StoredEntry {
    fn from(record: AnnotationRecord) -> Self {
        StoredEntry::Success(record)
    }
}

impl From<ErrorRecord> for StoredEntry {
    fn from(record: ErrorRecord) -> Self {
        StoredEntry::Failure(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_error_without_kind() {
        let plain = StoredEntry::try_from(json!({"error": "Connection reset"})).unwrap();
        assert_eq!(plain.error_kind(), Some(ErrorKind::Transport));

        let parse = StoredEntry::try_from(json!({
            "error": "Failed to parse JSON: list index out of range",
            "original_content": "I cannot help with that."
        }))
        .unwrap();
        assert_eq!(parse.error_kind(), Some(ErrorKind::Parse));
    }

    #[test]
    fn test_error_record_serialization() {
        let entry = StoredEntry::from(ErrorRecord::parse("bad block", "raw text"));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"error": "bad block", "kind": "parse", "original_content": "raw text"})
        );

        let entry = StoredEntry::from(ErrorRecord::transport("timeout"));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"error": "timeout", "kind": "transport"}));
    }

    #[test]
    fn test_success_entry() {
        let entry = StoredEntry::try_from(json!({
            "id_free": {"quality": "positive", "aesthetic": "positive", "emotion": "awe"}
        }))
        .unwrap();
        assert!(entry.is_success());
        assert!(!entry.needs_reprocess(&ReprocessPolicy::default()));
    }

    #[test]
    fn test_needs_reprocess_follows_policy() {
        let policy = ReprocessPolicy {
            retry_transport_failures: true,
            retry_parse_failures: false,
            retry_input_failures: true,
        };
        assert!(StoredEntry::from(ErrorRecord::transport("x")).needs_reprocess(&policy));
        assert!(!StoredEntry::from(ErrorRecord::parse("x", "raw")).needs_reprocess(&policy));
        assert!(StoredEntry::from(ErrorRecord::input("x")).needs_reprocess(&policy));
    }

    #[test]
    fn test_unrecognised_value_is_rejected() {
        assert!(StoredEntry::try_from(json!("done")).is_err());
        assert!(StoredEntry::try_from(json!({"foo": 1})).is_err());
    }
}
