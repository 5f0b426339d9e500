//! 会话历史
//!
//! 数据模型（Role / ContentBlock / Turn）与按会话 ID 分键的有界历史存储。
//! 每个会话最多保留 W 条 Turn，超出时先进先出淘汰；
//! 外层 std Mutex 只保护 map 查找，逐会话的 tokio Mutex 在整个消息处理期间持有，
//! 同一会话的消息串行、不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 Anthropic Messages API 一致，system 单独传递）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 结构化内容块，序列化后即为 Messages API 的 content 块格式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

/// 一条 Turn 的内容：纯文本或结构化块列表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// 会话历史中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: TurnContent::Text(content.into()) }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: TurnContent::Text(content.into()) }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content: TurnContent::Blocks(blocks) }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content: TurnContent::Blocks(blocks) }
    }

    /// 文本预览（/conversations 接口展示用）
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match &self.content {
            TurnContent::Text(t) => t.clone(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        };
        if text.chars().count() > max_chars {
            format!("{}...", text.chars().take(max_chars).collect::<String>())
        } else {
            text
        }
    }
}

/// 单个会话：有界历史 + 当前选中的凭证账户
#[derive(Debug)]
pub struct Conversation {
    turns: Vec<Turn>,
    window: usize,
    /// 该会话当前请求的账户（如 "work" / "personal"）；None 时由 AccountSelector 落到默认账户
    pub account: Option<String>,
}

impl Conversation {
    fn new(window: usize) -> Self {
        Self { turns: Vec::new(), window, account: None }
    }

    /// 追加一条 Turn；超过窗口时淘汰最旧的
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.window {
            let excess = self.turns.len() - self.window;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// /conversations 接口的摘要条目
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub user_id: String,
    pub message_count: usize,
    pub last_message: Option<String>,
}

/// 按会话 ID 分键的历史存储，进程级共享
pub struct ConversationStore {
    window: usize,
    conversations: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Conversation>>>>,
}

impl ConversationStore {
    pub fn new(window: usize) -> Self {
        Self { window, conversations: Mutex::new(HashMap::new()) }
    }

    /// 取出（必要时创建）某会话的句柄。调用方 lock().await 后持有锁处理整条消息，
    /// 即可保证同一会话串行而不同会话并行。
    pub fn entry(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<Conversation>> {
        let mut map = self.conversations.lock().expect("conversation store lock poisoned");
        map.entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Conversation::new(self.window))))
            .clone()
    }

    pub fn total(&self) -> usize {
        self.conversations.lock().expect("conversation store lock poisoned").len()
    }

    /// 所有会话的摘要（需要逐个拿会话锁，处理中的会话会短暂等待）
    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        let handles: Vec<(String, Arc<tokio::sync::Mutex<Conversation>>)> = {
            let map = self.conversations.lock().expect("conversation store lock poisoned");
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for (user_id, handle) in handles {
            let conv = handle.lock().await;
            out.push(ConversationSummary {
                user_id,
                message_count: conv.len(),
                last_message: conv.turns().last().map(|t| t.preview(120)),
            });
        }
        out
    }
}
