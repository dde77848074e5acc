//! 图片处理流程 - 流程层
//!
//! 核心职责：定义"一张图"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取图片并编码
//! 2. 请求推理接口（带重试）
//! 3. 解析回复中的 json 代码块
//!
//! 每一步的失败都转成失败记录返回，不向上抛错

use crate::models::{AnnotationRequest, ErrorKind, ErrorRecord, StoredEntry, WorkItem};
use crate::services::inference_client::{RequestClient, Transport};
use crate::services::ResponseParser;
use crate::utils::logging::truncate_text;
use crate::workflow::image_ctx::ImageCtx;
use std::fmt::Display;
use tracing::{debug, info, warn};

/// 单张图片的状态
///
/// `Pending -> InFlight -> {Completed, Failed}`，后两者都会落盘
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    InFlight,
    Completed,
    Failed(ErrorKind),
}

impl ItemState {
    /// 由落盘条目得到终态
    pub fn of(entry: &StoredEntry) -> Self {
        match entry.error_kind() {
            None => ItemState::Completed,
            Some(kind) => ItemState::Failed(kind),
        }
    }
}

impl Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Pending => f.write_str("待处理"),
            ItemState::InFlight => f.write_str("处理中"),
            ItemState::Completed => f.write_str("完成"),
            ItemState::Failed(kind) => write!(f, "失败({})", kind),
        }
    }
}

/// 图片处理流程
///
/// - 编排"读图 → 请求 → 解析"
/// - 不持有结果存储，不决定是否落盘
/// - 只依赖业务能力（services）
pub struct ImageFlow<T> {
    client: RequestClient<T>,
    instruction: String,
}

impl<T: Transport> ImageFlow<T> {
    pub fn new(client: RequestClient<T>, instruction: impl Into<String>) -> Self {
        Self {
            client,
            instruction: instruction.into(),
        }
    }

    pub fn client(&self) -> &RequestClient<T> {
        &self.client
    }

    /// 处理一张图片，返回需要写入结果文件的条目
    pub async fn run(&self, item: &WorkItem, ctx: &ImageCtx) -> StoredEntry {
        debug!("{} 状态: {} -> {}", ctx, ItemState::Pending, ItemState::InFlight);

        // ========== 1. 读取图片 ==========
        let bytes = match tokio::fs::read(&item.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{} ⚠️ 读取图片失败 {}: {}", ctx, item.path.display(), e);
                return ErrorRecord::input(format!("读取图片失败 {}: {}", item.path.display(), e)).into();
            }
        };
        let request = AnnotationRequest::new(self.instruction.as_str(), item.mime_type(), &bytes);

        // ========== 2. 请求推理接口 ==========
        let raw = match self.client.request(&request, &ctx.to_string()).await {
            Ok(raw) => raw,
            Err(record) => {
                warn!("{} ❌ 请求失败: {}", ctx, record.message);
                return record.into();
            }
        };

        // ========== 3. 解析回复 ==========
        match ResponseParser::parse(&raw) {
            Ok(record) => {
                info!("{} ✓ 解析成功，共 {} 个群体", ctx, record.len());
                record.into()
            }
            Err(record) => {
                warn!(
                    "{} ⚠️ 解析失败: {} | 原文: {}",
                    ctx,
                    record.message,
                    truncate_text(&raw, 120)
                );
                record.into()
            }
        }
    }
}
