//! 图片处理上下文
//!
//! 封装"我正在处理哪个组的第几张图"这一信息

use std::fmt::Display;

/// 图片处理上下文（仅用于日志）
#[derive(Debug, Clone)]
pub struct ImageCtx {
    /// 所属组
    pub group: String,
    /// 在本次待处理列表中的序号（从1开始）
    pub index: usize,
    /// 本次待处理总数
    pub total: usize,
    /// 文件名
    pub file_name: String,
}

impl ImageCtx {
    pub fn new(group: impl Into<String>, index: usize, total: usize, file_name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            index,
            total,
            file_name: file_name.into(),
        }
    }
}

impl Display for ImageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{} 组 {} | {}]",
            self.index, self.total, self.group, self.file_name
        )
    }
}
