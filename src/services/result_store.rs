//! 结果存储服务 - 业务能力层
//!
//! 图片文件名 → 标注结果 / 失败记录 的映射，每次写入后整体原子落盘。
//!
//! ## 落盘方式
//! 序列化到同目录下的临时文件，`fsync` 后原子重命名覆盖目标文件，
//! 因此外部永远看不到写了一半的结果文件。
//!
//! ## 旧格式
//! 早期结果文件按"会话"分组：`{"session_1": {"a.jpg": {...}}, ...}`。
//! 加载时展开为扁平映射，写回时总是扁平格式。

use crate::config::ReprocessPolicy;
use crate::error::StoreError;
use crate::models::StoredEntry;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 结果存储
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredEntry>,
}

/// 键名含 "session"、值为对象且本身不是一条结果的，视为旧格式的会话
///
/// 文件名里带 session 的图片（如 `photo_session_01.jpg`）仍按普通条目处理
fn is_session(key: &str, value: &JsonValue) -> bool {
    value.is_object()
        && key.to_lowercase().contains("session")
        && StoredEntry::try_from(value.clone()).is_err()
}

/// 结果文件的两种形态
enum StoreFile {
    Flat(Map<String, JsonValue>),
    /// 旧的按会话分组格式；`rest` 为混在其中的扁平条目
    Sessions {
        sessions: Vec<(String, Map<String, JsonValue>)>,
        rest: Map<String, JsonValue>,
    },
}

impl StoreFile {
    fn classify(object: Map<String, JsonValue>) -> Self {
        if !object.iter().any(|(k, v)| is_session(k, v)) {
            return StoreFile::Flat(object);
        }

        let mut sessions = Vec::new();
        let mut rest = Map::new();
        for (key, value) in object {
            if is_session(&key, &value) {
                if let JsonValue::Object(inner) = value {
                    sessions.push((key, inner));
                }
            } else {
                rest.insert(key, value);
            }
        }
        StoreFile::Sessions { sessions, rest }
    }

    /// 展开为扁平映射，后出现的会话覆盖先出现的
    fn flatten(self) -> Map<String, JsonValue> {
        match self {
            StoreFile::Flat(object) => object,
            StoreFile::Sessions { sessions, rest } => {
                info!("检测到旧的会话格式，共 {} 个会话，展开为扁平格式", sessions.len());
                let mut flat = rest;
                for (name, session) in sessions {
                    debug!("展开会话 {}: {} 条", name, session.len());
                    flat.extend(session);
                }
                flat
            }
        }
    }
}

impl ResultStore {
    /// 创建空存储（不读取文件）
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// 加载结果文件；文件不存在时返回空存储
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            info!("结果文件不存在，从空结果开始: {}", path.display());
            return Ok(Self::empty(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;

        let entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            let value: JsonValue =
                serde_json::from_str(&content).map_err(|source| StoreError::Decode {
                    path: path.clone(),
                    source,
                })?;
            decode_entries(value, &path)?
        };

        info!("已加载 {} 条结果: {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 是否已有成功结果
    pub fn has(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(StoredEntry::is_success)
    }

    /// 是否需要（重新）请求
    pub fn needs_processing(&self, id: &str, policy: &ReprocessPolicy) -> bool {
        match self.entries.get(id) {
            None => true,
            Some(entry) => entry.needs_reprocess(policy),
        }
    }

    pub fn get(&self, id: &str) -> Option<&StoredEntry> {
        self.entries.get(id)
    }

    /// 写入（覆盖旧条目）
    pub fn put(&mut self, id: impl Into<String>, entry: impl Into<StoredEntry>) {
        self.entries.insert(id.into(), entry.into());
    }

    pub fn entries(&self) -> &BTreeMap<String, StoredEntry> {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut BTreeMap<String, StoredEntry> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 成功条目数量
    pub fn success_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_success()).count()
    }

    /// 整体原子落盘
    pub fn flush(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &self.entries)?;
        debug!("结果已落盘: {} 条", self.entries.len());
        Ok(())
    }

    /// 以同样的方式写到另一个文件
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, &self.entries)
    }
}

fn decode_entries(value: JsonValue, path: &Path) -> Result<BTreeMap<String, StoredEntry>, StoreError> {
    let JsonValue::Object(object) = value else {
        return Err(StoreError::Decode {
            path: path.to_path_buf(),
            source: serde::de::Error::custom("结果文件顶层必须是对象"),
        });
    };

    let mut entries = BTreeMap::new();
    for (id, value) in StoreFile::classify(object).flatten() {
        match StoredEntry::try_from(value) {
            Ok(entry) => {
                entries.insert(id, entry);
            }
            Err(e) => warn!("无法识别的条目 {}，将重新处理: {}", id, e),
        }
    }
    Ok(entries)
}

/// 序列化后写入同目录临时文件，再原子替换目标文件
fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let bytes = serde_json::to_vec_pretty(value).map_err(|e| write_err(e.into()))?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    temp.write_all(&bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
