//! # Image Annotator
//!
//! 一个可断点续跑的批量图片标注工具：遍历分组的图片语料，
//! 让多模态模型按 13 个人群给出质量 / 美感 / 情绪评估，并逐张写入结果文件。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有网络客户端，只暴露能力
//! - `HttpTransport` - 唯一的 reqwest 持有者，提供"发一次请求"能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `CorpusWalker` - 语料遍历
//! - `RequestClient` - 带退避重试的推理请求
//! - `ResponseParser` - 回复解析
//! - `ResultStore` - 结果加载与原子落盘
//! - `taxonomy` - 取值校验 / 规范化
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张图"的完整处理流程
//! - `ImageCtx` - 上下文封装（组名 + 序号 + 文件名）
//! - `ImageFlow` - 流程编排（读图 → 请求 → 解析）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 应用入口，管理资源和收尾
//! - `orchestrator/pipeline` - 并发处理与逐张落盘
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, ReprocessPolicy, RetryPolicy};
pub use error::{AppError, AppResult};
pub use infrastructure::HttpTransport;
pub use models::{AnnotationRecord, ErrorKind, ErrorRecord, StoredEntry, WorkGroup, WorkItem};
pub use orchestrator::{App, Pipeline, RunState, RunSummary, Shutdown};
pub use services::{CorpusWalker, RequestClient, ResponseParser, ResultStore, Transport};
pub use workflow::{ImageCtx, ImageFlow, ItemState};
