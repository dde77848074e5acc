//! 推理请求服务 - 业务能力层
//!
//! 只负责"发出一张图片的请求并拿到原始回复"，带有限次数的指数退避重试。
//! 具体怎么发请求由 `Transport` 决定（生产环境为 `HttpTransport`）。

use crate::config::RetryPolicy;
use crate::error::TransportError;
use crate::models::{AnnotationRequest, ErrorRecord};
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 单次请求能力
///
/// 实现方只负责一次尝试，重试由 `RequestClient` 统一处理
pub trait Transport {
    fn send(
        &self,
        request: &AnnotationRequest,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

impl<T: Transport + Sync> Transport for &T {
    fn send(
        &self,
        request: &AnnotationRequest,
    ) -> impl Future<Output = Result<String, TransportError>> + Send {
        (**self).send(request)
    }
}

/// 推理请求客户端
///
/// 职责：
/// - 调用 `Transport` 发送请求
/// - 传输失败时按 `RetryPolicy` 退避重试
/// - 重试耗尽后返回失败记录（不中止批次）
pub struct RequestClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RequestClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 发送请求，最多尝试 `max_attempts` 次
    ///
    /// # 参数
    /// - `request`: 请求载荷
    /// - `label`: 日志中显示的图片标识
    ///
    /// # 返回
    /// 成功返回模型回复原文；重试耗尽返回带最后一次错误的 `ErrorRecord`
    pub async fn request(&self, request: &AnnotationRequest, label: &str) -> Result<String, ErrorRecord> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            match self.transport.send(request).await {
                Ok(content) => {
                    debug!("[{}] 第 {} 次尝试成功", label, attempt);
                    return Ok(content);
                }
                Err(e) => {
                    warn!("[{}] 请求失败 (尝试 {}/{}): {}", label, attempt, max_attempts, e);
                    if attempt < max_attempts {
                        let delay = self.policy.next_backoff(attempt);
                        warn!("[{}] {:.2} 秒后重试...", label, delay.as_secs_f64());
                        sleep(delay).await;
                    } else {
                        warn!("[{}] 已达到最大重试次数，跳过该图片", label);
                    }
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "未发出任何请求".to_string());
        Err(ErrorRecord::transport(message))
    }
}
