//! 工具注册表与分发
//!
//! Tool trait（name / description / input_schema / execute），启动时按可解析的凭证
//! 注册一次，此后只读。dispatch 永不向循环抛错：未知工具名、执行超时、执行器返回 Err
//! 都转成 {"success": false, "error": ...} 负载，让模型自己对失败做出反应。
//! 每次分发输出一条结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::error::BotError;

/// 模型侧可见的工具描述，序列化后直接放进 Messages API 的 tools 数组
#[derive(Clone, Debug, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 每次分发携带的会话上下文（账户选择在此传入，不塞进模型可见的参数里）
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    /// 该会话请求的凭证账户；None 时由 AccountSelector 落到默认账户
    pub account: Option<String>,
}

/// 工具 trait：执行器返回 JSON 负载（约定至少含 success 字段）；
/// 返回的 Err 会在 dispatch 处被拦截转为失败负载，不会越过分发边界
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// 供模型理解何时调用
    fn description(&self) -> &str;

    /// 参数 JSON Schema，默认无参数
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, BotError>;
}

/// 工具注册表：启动时构建一次的分发表，带统一的单次调用超时
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self { tools: HashMap::new(), call_timeout }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 模型侧工具描述（按名称排序，保证请求体稳定）
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// 分发一次工具调用，总是返回 JSON 负载。
    /// 单个工具失败不能中止整轮会话：失败在这里收敛为 {"success": false, "error": ...}。
    pub async fn dispatch(&self, name: &str, input: Value, ctx: &ToolContext) -> Value {
        let start = Instant::now();
        let args_preview = preview(&input);

        let result = match self.tools.get(name) {
            None => {
                tracing::warn!(tool = name, "model requested unknown tool");
                Err(format!("unknown tool: {name}"))
            }
            Some(tool) => match timeout(self.call_timeout, tool.execute(input, ctx)).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => {
                    Err(format!("tool timed out after {}s", self.call_timeout.as_secs()))
                }
            },
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(e) if e.starts_with("unknown tool") => (false, "unknown"),
            Err(e) if e.contains("timed out") => (false, "timeout"),
            Err(_) => (false, "error"),
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(payload) => payload,
            Err(error) => json!({ "success": false, "error": error }),
        }
    }
}

fn preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
