//! 语料遍历服务 - 业务能力层
//!
//! 只负责"按确定顺序列出所有图片"，不关心处理流程。
//! 组目录按名称排序，组内文件按名称排序，同一语料多次运行得到相同顺序。

use crate::config::ReprocessPolicy;
use crate::error::EnumerationError;
use crate::models::{WorkGroup, WorkItem};
use crate::services::ResultStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 语料遍历器
pub struct CorpusWalker {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
}

impl CorpusWalker {
    /// 创建遍历器，扩展名不区分大小写、可带或不带前导点
    pub fn new(root: impl Into<PathBuf>, extensions: &[String], recursive: bool) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            recursive,
        }
    }

    /// 列出所有组及其图片
    ///
    /// 根目录不可读时报错；空语料返回空列表
    pub fn enumerate(&self) -> Result<Vec<WorkGroup>, EnumerationError> {
        if !self.root.exists() {
            return Err(EnumerationError::RootNotFound {
                path: self.root.clone(),
            });
        }
        if !self.root.is_dir() {
            return Err(EnumerationError::NotADirectory {
                path: self.root.clone(),
            });
        }

        let group_dirs: Vec<(String, PathBuf)> = read_dir_sorted(&self.root)?
            .into_iter()
            .filter(|(_, path)| path.is_dir())
            .collect();

        let mut groups = Vec::with_capacity(group_dirs.len());
        for (name, dir) in group_dirs {
            let items = if self.recursive {
                self.collect_recursive(&name, &dir)?
            } else {
                self.collect_flat(&name, &dir)?
            };
            debug!("组 {}: {} 张图片", name, items.len());
            groups.push(WorkGroup { name, items });
        }

        warn_duplicate_names(&groups);
        Ok(groups)
    }

    /// 组目录下一层的图片
    fn collect_flat(&self, group: &str, dir: &Path) -> Result<Vec<WorkItem>, EnumerationError> {
        let files: Vec<(String, PathBuf)> = read_dir_sorted(dir)?
            .into_iter()
            .filter(|(name, path)| path.is_file() && self.is_image(name))
            .collect();

        Ok(files
            .into_iter()
            .map(|(name, path)| WorkItem::new(group, name, absolute(path)))
            .collect())
    }

    /// 组目录下所有层级的图片，每层按名称排序
    fn collect_recursive(&self, group: &str, dir: &Path) -> Result<Vec<WorkItem>, EnumerationError> {
        let mut items = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_image(&name) {
                items.push(WorkItem::new(group, name, absolute(entry.into_path())));
            }
        }
        Ok(items)
    }

    fn is_image(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

/// 过滤出需要处理的图片（保持原有顺序）
pub fn pending_items<'a>(
    groups: &'a [WorkGroup],
    store: &ResultStore,
    policy: &ReprocessPolicy,
) -> Vec<&'a WorkItem> {
    groups
        .iter()
        .flat_map(|g| g.items.iter())
        .filter(|item| store.needs_processing(item.id(), policy))
        .collect()
}

/// 目录下的条目，按名称排序
fn read_dir_sorted(dir: &Path) -> Result<Vec<(String, PathBuf)>, EnumerationError> {
    let read_err = |source| EnumerationError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let name = entry.file_name().to_string_lossy().to_string();
        entries.push((name, entry.path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// 结果文件以文件名为键，不同组的同名文件会互相覆盖
fn warn_duplicate_names(groups: &[WorkGroup]) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for group in groups {
        for item in &group.items {
            if let Some(first) = seen.insert(item.id(), &group.name) {
                warn!(
                    "⚠️ 文件名重复: {} 同时出现在组 {} 和 {}，结果将互相覆盖",
                    item.id(),
                    first,
                    group.name
                );
            }
        }
    }
}
