//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度、并发控制和落盘顺序，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行、收尾）
//! - 加载语料和已有结果
//! - 批次结束后的取值校验 / 规范化
//! - 输出全局统计信息
//!
//! ### `pipeline` - 批次流水线
//! - 过滤已完成的图片
//! - 多个 worker 并发处理
//! - 逐张写入并原子落盘
//!
//! ### `shutdown` - 停止信号
//! - 监听 Ctrl-C / SIGTERM
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<WorkGroup>)
//!     ↓
//! pipeline (处理待处理的 WorkItem)
//!     ↓
//! workflow::ImageFlow (处理单张图片)
//!     ↓
//! services (能力层：walker / client / parser / store / taxonomy)
//!     ↓
//! infrastructure (基础设施：HttpTransport)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一写入点**：只有编排层修改 `ResultStore`
//! 2. **先落盘后完成**：结果写入文件后才记为完成
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod batch_processor;
pub mod pipeline;
pub mod shutdown;

// 重新导出主要类型
pub use batch_processor::App;
pub use pipeline::{Pipeline, RunState, RunSummary};
pub use shutdown::{listen_for_signals, Shutdown, ShutdownTrigger};
