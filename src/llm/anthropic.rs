//! Anthropic Messages API 客户端
//!
//! 用 reqwest 直接调 /v1/messages（tool_use 语义 OpenAI 兼容层表达不了），
//! 请求体中的 content 块直接复用 history::ContentBlock 的 serde 表示。
//! HTTP 状态映射到错误类别：429 -> RateLimit、401/403 -> Authentication、
//! 请求超时 -> Timeout、其余非 2xx -> Api。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::history::{ContentBlock, Turn, TurnContent};
use crate::llm::{ModelClient, ModelResponse, StopReason};
use crate::tools::ToolSchema;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a TurnContent,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

/// Anthropic 客户端：模型名与请求超时来自配置
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        request_timeout: Duration,
    ) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BotError::api(format!("failed to build http client: {e}")))?;
        Ok(Self { client, api_key: api_key.into(), model: model.into(), max_tokens })
    }

    fn build_request<'a>(
        &'a self,
        history: &'a [Turn],
        system: &'a str,
        tools: &'a [ToolSchema],
    ) -> MessagesRequest<'a> {
        let messages = history
            .iter()
            .map(|t| WireMessage {
                role: match t.role {
                    crate::history::Role::User => "user",
                    crate::history::Role::Assistant => "assistant",
                },
                content: &t.content,
            })
            .collect();
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn invoke(
        &self,
        history: &[Turn],
        system: &str,
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, BotError> {
        let request = self.build_request(history, system, tools);

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BotError::timeout(format!("model request timed out: {e}"))
                } else {
                    BotError::api(format!("model request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("model API error: {status} - {body}");
            return Err(match status.as_u16() {
                429 => BotError::rate_limit(message),
                401 | 403 => BotError::authentication(message),
                _ => BotError::api(message),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BotError::api(format!("malformed model response: {e}")))?;

        let stop_reason = match parsed.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            _ => StopReason::Final,
        };
        tracing::debug!(stop_reason = ?stop_reason, blocks = parsed.content.len(), "model responded");

        Ok(ModelResponse { stop_reason, content: parsed.content })
    }
}
