//! 机器人组装与单条消息处理管线
//!
//! BotComponents 持有整条链路的共享组件（模型客户端、工具注册表、弹性层、
//! 会话存储、错误统计）。handle_inbound_message 是唯一入口：任何错误都在这里
//! 收敛为一条用户可见文案，绝不向 webhook 层抛异常。

use std::sync::Arc;
use std::time::Duration;

use crate::accounts::{AccountSelector, CredentialStore};
use crate::chat::{run_chat_loop, LoopOutcome, FALLBACK_REPLY};
use crate::config::BotConfig;
use crate::error::{user_message, BotError};
use crate::history::{ConversationStore, ConversationSummary, Turn};
use crate::llm::{AnthropicClient, ModelClient};
use crate::media::media_annotation;
use crate::resilience::{BreakerRegistry, RetryPolicy, BREAKER_CLAUDE};
use crate::stats::ErrorStats;
use crate::tools::{build_registry, ToolContext, ToolRegistry};

/// 找不到 config/prompts/system.md 时使用的系统提示词
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful personal assistant reachable over \
WhatsApp. Keep replies short and conversational. Use the available tools to manage the \
user's tasks and calendar when asked.";

/// 进程级组件集合，axum state 与测试都从这里取
pub struct BotComponents {
    pub model: Arc<dyn ModelClient>,
    pub registry: ToolRegistry,
    pub retry: RetryPolicy,
    pub breakers: BreakerRegistry,
    pub store: ConversationStore,
    pub stats: Arc<ErrorStats>,
    pub selector: Arc<AccountSelector>,
    pub system_prompt: String,
    pub max_turns: u32,
}

impl BotComponents {
    /// 按配置组装生产环境组件（真实 Anthropic 客户端 + 按凭证注册的工具）
    pub fn create(config: &BotConfig) -> Result<Self, BotError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| BotError::authentication("ANTHROPIC_API_KEY is not set"))?;
        let model = AnthropicClient::new(
            api_key,
            config.llm.model.clone(),
            config.llm.max_tokens,
            Duration::from_secs(config.llm.request_timeout_secs),
        )?;
        Self::with_model(config, Arc::new(model))
    }

    /// 用任意模型客户端组装（测试注入 Mock 的入口）
    pub fn with_model(
        config: &BotConfig,
        model: Arc<dyn ModelClient>,
    ) -> Result<Self, BotError> {
        let stats = Arc::new(ErrorStats::new());
        let breakers = BreakerRegistry::standard(stats.clone());
        let selector = Arc::new(AccountSelector::new(
            CredentialStore::from_env(),
            config.accounts.default.clone(),
        ));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.tools.tool_timeout_secs))
            .build()
            .map_err(|e| BotError::generic(format!("failed to build http client: {e}")))?;
        let registry = build_registry(
            &http,
            &selector,
            &breakers,
            Duration::from_secs(config.tools.tool_timeout_secs),
        );
        tracing::info!(tools = registry.len(), "tool registry built");

        let system_prompt = std::fs::read_to_string("config/prompts/system.md")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            model,
            registry,
            retry: RetryPolicy::new(
                config.retry.max_retries,
                Duration::from_millis(config.retry.initial_delay_ms),
                config.retry.backoff_base,
            ),
            breakers,
            store: ConversationStore::new(config.app.history_window),
            stats,
            selector,
            system_prompt,
            max_turns: config.app.max_loop_turns,
        })
    }

    /// 处理一条入站消息，返回应回给用户的文本。
    /// 会话锁在整个处理期间持有：同一会话的消息严格串行。
    pub async fn handle_inbound_message(
        &self,
        conversation_id: &str,
        text: &str,
        media_urls: &[String],
    ) -> String {
        let handle = self.store.entry(conversation_id);
        let mut conv = handle.lock().await;

        // 账户切换命令不经过模型
        if let Some(reply) = self.try_account_command(text, &mut conv.account) {
            return reply;
        }

        let mut user_text = text.trim().to_string();
        if let Some(note) = media_annotation(media_urls) {
            if user_text.is_empty() {
                user_text = note;
            } else {
                user_text = format!("{user_text}\n{note}");
            }
        }
        if user_text.is_empty() {
            return "Please send a text message.".to_string();
        }
        conv.push(Turn::user(user_text));

        // 工具循环在历史的工作副本上运行：中间的 tool_use / tool_result 块
        // 不落入持久历史，只保留用户消息与最终回复
        let mut working = conv.turns().to_vec();
        let ctx = ToolContext { account: conv.account.clone() };
        let breaker = self.breakers.get(BREAKER_CLAUDE);

        let reply = match run_chat_loop(
            self.model.as_ref(),
            &self.registry,
            &self.retry,
            &breaker,
            &mut working,
            &self.system_prompt,
            &ctx,
            self.max_turns,
        )
        .await
        {
            Ok(LoopOutcome::Final(text)) => text,
            Ok(LoopOutcome::TurnsExhausted) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                let correlation_id = self.stats.record(&e);
                tracing::error!(
                    conversation = conversation_id,
                    %correlation_id,
                    error = %e,
                    "message processing failed"
                );
                user_message(&e, "processing your message")
            }
        };

        conv.push(Turn::assistant(reply.clone()));
        reply
    }

    /// "/account work" / "/account personal" 切换该会话使用的凭证账户
    fn try_account_command(&self, text: &str, account: &mut Option<String>) -> Option<String> {
        let rest = text.trim().strip_prefix("/account")?;
        let requested = rest.trim();
        if requested.is_empty() {
            let current = account.as_deref().unwrap_or(self.selector.default_account());
            return Some(format!("Current account: {current}"));
        }
        *account = Some(requested.to_string());
        Some(format!("Switched to account: {requested}"))
    }

    /// /health 接口的聚合快照
    pub fn health(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "circuit_breakers": self.breakers.snapshot(),
            "error_stats": self.stats.snapshot(),
            "conversations": { "total": self.store.total() },
            "available_tools": self.registry.schemas().iter().map(|s| s.name.clone())
                .collect::<Vec<_>>(),
        })
    }

    pub async fn conversation_summaries(&self) -> Vec<ConversationSummary> {
        self.store.summaries().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModelClient;

    fn components(model: Arc<dyn ModelClient>) -> BotComponents {
        BotComponents::with_model(&BotConfig::load_from("no/such/dir").unwrap(), model)
            .unwrap()
    }

    #[tokio::test]
    async fn reply_and_history_are_persisted() {
        let mock = Arc::new(MockModelClient::new());
        mock.push_final("sure, added it");
        let bot = components(mock);

        let reply = bot.handle_inbound_message("whatsapp:+111", "add milk", &[]).await;
        assert_eq!(reply, "sure, added it");

        let handle = bot.store.entry("whatsapp:+111");
        let conv = handle.lock().await;
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[0], Turn::user("add milk"));
        assert_eq!(conv.turns()[1], Turn::assistant("sure, added it"));
    }

    #[tokio::test]
    async fn terminal_error_becomes_user_facing_text_and_is_counted() {
        let mock = Arc::new(MockModelClient::new());
        mock.push(Err(BotError::authentication("bad key")));
        let bot = components(mock);

        let reply = bot.handle_inbound_message("whatsapp:+111", "hello", &[]).await;
        assert_eq!(reply, "🔐 Authentication failed. Please contact support.");

        let snap = bot.stats.snapshot();
        assert_eq!(snap["total_errors"], 1);
        assert_eq!(snap["count_by_kind"]["authentication_error"], 1);

        // 失败也要留下 assistant 回复，保证历史成对
        let handle = bot.store.entry("whatsapp:+111");
        assert_eq!(handle.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn account_command_switches_without_model_call() {
        let mock = Arc::new(MockModelClient::new());
        let calls = mock.clone();
        let bot = components(mock);

        let reply = bot.handle_inbound_message("whatsapp:+111", "/account personal", &[]).await;
        assert_eq!(reply, "Switched to account: personal");
        assert_eq!(calls.call_count(), 0);

        let reply = bot.handle_inbound_message("whatsapp:+111", "/account", &[]).await;
        assert_eq!(reply, "Current account: personal");
    }

    #[tokio::test]
    async fn media_only_message_gets_annotated() {
        let mock = Arc::new(MockModelClient::new());
        let bot = components(mock);

        let urls = vec!["https://api.twilio.com/media/abc".to_string()];
        // Mock 的兜底行为是回显最后一条用户文本
        let reply = bot.handle_inbound_message("whatsapp:+111", "", &urls).await;
        assert!(reply.contains("[User attached media: https://api.twilio.com/media/abc]"));
    }

    #[tokio::test]
    async fn empty_message_without_media_is_rejected() {
        let mock = Arc::new(MockModelClient::new());
        let bot = components(mock);
        let reply = bot.handle_inbound_message("whatsapp:+111", "   ", &[]).await;
        assert_eq!(reply, "Please send a text message.");
    }

    #[tokio::test]
    async fn health_snapshot_has_all_sections() {
        let mock = Arc::new(MockModelClient::new());
        let bot = components(mock);
        let health = bot.health();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["circuit_breakers"]["claude"]["state"], "closed");
        assert_eq!(health["error_stats"]["total_errors"], 0);
        assert_eq!(health["conversations"]["total"], 0);
    }
}
