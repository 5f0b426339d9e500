//! Mock 模型客户端（测试用，无需 API）
//!
//! 按脚本依次返回预置响应（含 Err 注入）；脚本耗尽后回显最后一条用户文本，
//! 便于在无网络环境下跑通完整工具循环。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BotError;
use crate::history::{ContentBlock, Turn, TurnContent};
use crate::llm::{ModelClient, ModelResponse, StopReason};
use crate::tools::ToolSchema;

/// Mock 客户端：脚本化响应 + 调用计数
#[derive(Debug, Default)]
pub struct MockModelClient {
    script: Mutex<VecDeque<Result<ModelResponse, BotError>>>,
    calls: AtomicUsize,
    /// 为 true 时脚本耗尽后仍持续返回 tool_use（测 turn 预算用）
    repeat_last_tool_use: Mutex<Option<(String, Value)>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队一条最终文本响应
    pub fn push_final(&self, text: impl Into<String>) {
        self.push(Ok(ModelResponse {
            stop_reason: StopReason::Final,
            content: vec![ContentBlock::Text { text: text.into() }],
        }));
    }

    /// 入队一条 tool_use 响应（单个工具调用）
    pub fn push_tool_use(&self, id: &str, name: &str, input: Value) {
        self.push(Ok(ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
        }));
    }

    /// 入队一条完整响应（多块、自定义 stop_reason）
    pub fn push(&self, response: Result<ModelResponse, BotError>) {
        self.script.lock().expect("mock script lock").push_back(response);
    }

    /// 脚本耗尽后无限返回对该工具的调用（每次生成新的 call id）
    pub fn always_tool_use(&self, name: &str, input: Value) {
        *self.repeat_last_tool_use.lock().expect("mock repeat lock") =
            Some((name.to_string(), input));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        history: &[Turn],
        _system: &str,
        _tools: &[ToolSchema],
    ) -> Result<ModelResponse, BotError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(scripted) = self.script.lock().expect("mock script lock").pop_front() {
            return scripted;
        }

        if let Some((name, input)) = self.repeat_last_tool_use.lock().expect("mock repeat lock").clone()
        {
            return Ok(ModelResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![ContentBlock::ToolUse {
                    id: format!("toolu_mock_{n}"),
                    name,
                    input,
                }],
            });
        }

        // 默认行为：回显最后一条用户文本
        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == crate::history::Role::User)
            .and_then(|t| match &t.content {
                TurnContent::Text(text) => Some(text.as_str()),
                TurnContent::Blocks(_) => None,
            })
            .unwrap_or("(no input)");
        Ok(ModelResponse {
            stop_reason: StopReason::Final,
            content: vec![ContentBlock::Text { text: format!("Echo from Mock: {last_user}") }],
        })
    }
}
