//! 业务能力层（Services Layer）
//!
//! 每个服务只提供一种能力，不关心调用顺序：
//! - `corpus_walker`: 按确定顺序列出语料中的图片
//! - `inference_client`: 带退避重试的推理请求
//! - `response_parser`: 从模型回复中取出标注
//! - `result_store`: 结果文件的加载与原子落盘
//! - `taxonomy`: 批次结束后的取值校验 / 规范化

pub mod corpus_walker;
pub mod inference_client;
pub mod response_parser;
pub mod result_store;
pub mod taxonomy;

pub use corpus_walker::{pending_items, CorpusWalker};
pub use inference_client::{RequestClient, Transport};
pub use response_parser::ResponseParser;
pub use result_store::ResultStore;
