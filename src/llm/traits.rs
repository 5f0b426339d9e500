//! 模型客户端抽象
//!
//! 所有后端（Anthropic / Mock）实现 ModelClient：一次性传入当前历史、系统提示词
//! 与可用工具 schema，返回 stop_reason + 内容块。

use async_trait::async_trait;

use crate::error::BotError;
use crate::history::{ContentBlock, Turn};
use crate::tools::ToolSchema;

/// 模型一次响应的终止原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// 模型请求执行工具，content 中含 tool_use 块
    ToolUse,
    /// 最终回复，content 中的文本段拼接后即为答案
    Final,
}

/// 模型一次调用的响应
#[derive(Clone, Debug)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

impl ModelResponse {
    /// 拼接所有文本段
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// 模型客户端 trait：对话式调用，带工具 schema
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        history: &[Turn],
        system: &str,
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, BotError>;
}
