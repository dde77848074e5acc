//! HTTP 传输 - 基础设施层
//!
//! 唯一持有 `reqwest::Client` 的地方，只暴露"发一次请求"的能力，不做重试

use crate::config::Config;
use crate::error::TransportError;
use crate::models::AnnotationRequest;
use crate::services::inference_client::Transport;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageUrl,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 响应体最多保留多少字符到错误信息里
const MAX_ERROR_BODY_CHARS: usize = 300;

/// 基于 reqwest 的 OpenAI 兼容接口传输
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
    max_tokens: u32,
}

impl HttpTransport {
    /// 根据配置创建传输
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        Self::with_endpoint(
            &config.api_base_url,
            &config.api_key,
            &config.model_name,
            config.max_tokens,
            config.retry.request_timeout,
        )
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model_name: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            max_tokens,
        })
    }

    /// 构建请求体：一条 user 消息，包含文本和图片两部分
    pub fn build_body(&self, request: &AnnotationRequest) -> Result<CreateChatCompletionRequest, TransportError> {
        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.instruction.clone(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: request.data_url(),
                        detail: None,
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| TransportError::Request(format!("构建请求失败: {}", e)))?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| TransportError::Request(format!("构建请求失败: {}", e)))
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &AnnotationRequest) -> Result<String, TransportError> {
        let body = self.build_body(request)?;

        debug!("调用推理接口，模型: {}", self.model_name);

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        extract_content(&text)
    }
}

/// 响应信封中我们关心的部分
#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 从响应体中取出第一条回复
///
/// 响应体不是 JSON、没有 choices 或 content 缺失，都算传输失败
pub fn extract_content(body: &str) -> Result<String, TransportError> {
    let envelope: ChatEnvelope = serde_json::from_str(body)
        .map_err(|e| TransportError::MalformedEnvelope(e.to_string()))?;

    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(TransportError::EmptyContent)
}
