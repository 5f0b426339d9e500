//! 端到端消息管线集成测试（Mock 模型，不触网）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use waggle::agent::BotComponents;
use waggle::chat::FALLBACK_REPLY;
use waggle::config::BotConfig;
use waggle::error::BotError;
use waggle::history::{ContentBlock, Turn, TurnContent};
use waggle::llm::{MockModelClient, ModelClient, ModelResponse};
use waggle::tools::{Tool, ToolContext, ToolRegistry};

fn config() -> BotConfig {
    BotConfig::load_from("no/such/dir").unwrap()
}

fn bot(model: Arc<dyn ModelClient>) -> BotComponents {
    BotComponents::with_model(&config(), model).unwrap()
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its input back"
    }
    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, BotError> {
        Ok(json!({ "success": true, "echo": input }))
    }
}

/// 工具调用流程：tool_use -> dispatch -> tool_result 回灌 -> 最终回复
#[tokio::test]
async fn tool_round_trip_produces_final_reply() {
    let mock = Arc::new(MockModelClient::new());
    mock.push_tool_use("toolu_1", "echo", json!({"msg": "ping"}));
    mock.push_final("the tool said ping");

    let mut components = bot(mock.clone());
    let mut registry = ToolRegistry::new(Duration::from_secs(30));
    registry.register(EchoTool);
    components.registry = registry;

    let reply = components.handle_inbound_message("whatsapp:+1555", "run echo", &[]).await;
    assert_eq!(reply, "the tool said ping");
    assert_eq!(mock.call_count(), 2);

    // 持久历史只有用户消息与最终回复，中间工具块不落盘
    let handle = components.store.entry("whatsapp:+1555");
    let conv = handle.lock().await;
    assert_eq!(conv.len(), 2);
    assert_eq!(conv.turns()[0], Turn::user("run echo"));
    assert_eq!(conv.turns()[1], Turn::assistant("the tool said ping"));
}

/// 未知工具：失败负载出现在下一轮发给模型的 tool_result 里，循环不中断
#[tokio::test]
async fn unknown_tool_failure_is_visible_to_model() {
    struct CapturingModel {
        inner: MockModelClient,
        captured: std::sync::Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl ModelClient for CapturingModel {
        async fn invoke(
            &self,
            history: &[Turn],
            system: &str,
            tools: &[waggle::tools::ToolSchema],
        ) -> Result<ModelResponse, BotError> {
            self.captured.lock().unwrap().push(history.to_vec());
            self.inner.invoke(history, system, tools).await
        }
    }

    let inner = MockModelClient::new();
    inner.push_tool_use("toolu_9", "does_not_exist", json!({}));
    inner.push_final("sorry, that tool is unavailable");
    let model = Arc::new(CapturingModel { inner, captured: std::sync::Mutex::new(Vec::new()) });

    let components = bot(model.clone());
    let reply = components.handle_inbound_message("whatsapp:+1555", "try it", &[]).await;
    assert_eq!(reply, "sorry, that tool is unavailable");

    let captured = model.captured.lock().unwrap();
    assert_eq!(captured.len(), 2);
    // 第二次调用的历史末尾必须有包含失败负载的 tool_result
    let last = captured[1].last().unwrap();
    match &last.content {
        TurnContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult { tool_use_id, content } => {
                assert_eq!(tool_use_id, "toolu_9");
                assert!(content.contains("\"success\":false"));
                assert!(content.contains("unknown tool: does_not_exist"));
            }
            other => panic!("expected tool_result, got {other:?}"),
        },
        other => panic!("expected blocks, got {other:?}"),
    }
}

/// 模型一直要工具：第 5 轮后停，回兜底文案，不算错误
#[tokio::test]
async fn turn_budget_exhaustion_returns_fallback() {
    let mock = Arc::new(MockModelClient::new());
    mock.always_tool_use("echo", json!({}));

    let components = bot(mock.clone());
    let reply = components.handle_inbound_message("whatsapp:+1555", "loop", &[]).await;
    assert_eq!(reply, FALLBACK_REPLY);
    assert_eq!(mock.call_count(), 5);
    assert_eq!(components.stats.snapshot()["total_errors"], 0);
}

/// 终态错误：计入统计、转为用户文案、历史仍然成对
#[tokio::test]
async fn terminal_error_is_recorded_and_translated() {
    let mock = Arc::new(MockModelClient::new());
    mock.push(Err(BotError::authentication("api key was rejected")));

    let components = bot(mock);
    let reply = components.handle_inbound_message("whatsapp:+1555", "hello", &[]).await;
    assert_eq!(reply, "🔐 Authentication failed. Please contact support.");

    let snap = components.stats.snapshot();
    assert_eq!(snap["total_errors"], 1);
    assert_eq!(snap["count_by_kind"]["authentication_error"], 1);
    assert_eq!(snap["last_error"]["kind"], "authentication_error");
}

/// 同一会话串行，不同会话并行
#[tokio::test]
async fn conversations_are_isolated() {
    let mock = Arc::new(MockModelClient::new());
    mock.push_final("reply for alice");
    mock.push_final("reply for bob");

    let components = Arc::new(bot(mock));
    let a = {
        let c = components.clone();
        tokio::spawn(async move { c.handle_inbound_message("whatsapp:+1", "hi", &[]).await })
    };
    let b = {
        let c = components.clone();
        tokio::spawn(async move { c.handle_inbound_message("whatsapp:+2", "yo", &[]).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    // Mock 脚本是全局顺序的，两个回复各归一个会话
    let mut got = vec![a, b];
    got.sort();
    assert_eq!(got, vec!["reply for alice".to_string(), "reply for bob".to_string()]);
    assert_eq!(components.store.total(), 2);

    let h1 = components.store.entry("whatsapp:+1");
    assert_eq!(h1.lock().await.len(), 2);
}

/// 历史窗口：长对话只保留最近 10 条
#[tokio::test]
async fn history_window_caps_long_conversations() {
    let mock = Arc::new(MockModelClient::new());
    let components = bot(mock);

    for i in 0..8 {
        // Mock 脚本为空时回显用户文本
        components.handle_inbound_message("whatsapp:+1555", &format!("msg {i}"), &[]).await;
    }

    let handle = components.store.entry("whatsapp:+1555");
    let conv = handle.lock().await;
    assert_eq!(conv.len(), 10);
    // 最早的 3 轮问答已被淘汰
    assert_eq!(conv.turns()[0], Turn::user("msg 3"));
    assert_eq!(conv.turns()[9], Turn::assistant("Echo from Mock: msg 7"));
}
