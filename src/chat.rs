//! 有界多轮工具调用循环
//!
//! 每处理一条入站消息最多走 max_turns 轮模型调用；每轮要么拿到最终文本回复，
//! 要么按模型请求分发工具并把结果回灌历史。工具失败以负载的形式留在历史里
//! 供模型下一轮处理，只有模型调用本身的错误（重试耗尽/熔断打开）才向上抛。

use crate::error::BotError;
use crate::history::{ContentBlock, Turn};
use crate::llm::{ModelClient, StopReason};
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::tools::{ToolContext, ToolRegistry};

/// 轮次预算耗尽时回给用户的兜底文案
pub const FALLBACK_REPLY: &str =
    "I apologize, but I'm having trouble completing that request. Please try again.";

/// 循环的两种正常出口；模型调用失败走 Err
#[derive(Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// 模型给出最终文本回复
    Final(String),
    /// 轮次预算耗尽，模型仍在请求工具
    TurnsExhausted,
}

/// 运行一次完整的工具调用循环。history 在循环内被原地扩展
/// （assistant 的 tool_use 块与对应的 tool_result 块都会追加进去），
/// 调用方决定这些中间 Turn 是否落入持久历史。
pub async fn run_chat_loop(
    model: &dyn ModelClient,
    registry: &ToolRegistry,
    retry: &RetryPolicy,
    breaker: &CircuitBreaker,
    history: &mut Vec<Turn>,
    system: &str,
    ctx: &ToolContext,
    max_turns: u32,
) -> Result<LoopOutcome, BotError> {
    let schemas = registry.schemas();

    for turn in 0..max_turns {
        let response = {
            let snapshot: &[Turn] = history;
            let schemas: &[_] = &schemas;
            retry
                .run(Some(breaker), move || model.invoke(snapshot, system, schemas))
                .await?
        };

        if response.stop_reason != StopReason::ToolUse {
            return Ok(LoopOutcome::Final(response.text()));
        }

        let requests: Vec<(String, String, serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        // stop_reason 为 tool_use 但没有 tool_use 块，按最终回复处理
        if requests.is_empty() {
            return Ok(LoopOutcome::Final(response.text()));
        }

        tracing::debug!(turn, tools = requests.len(), "dispatching tool requests");

        let mut results = Vec::with_capacity(requests.len());
        for (id, name, input) in requests {
            let payload = registry.dispatch(&name, input, ctx).await;
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content: payload.to_string(),
            });
        }

        history.push(Turn::assistant_blocks(response.content));
        history.push(Turn::user_blocks(results));
    }

    tracing::warn!(max_turns, "tool loop exhausted its turn budget");
    Ok(LoopOutcome::TurnsExhausted)
}
