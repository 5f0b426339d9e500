//! 配置加载
//!
//! 分层来源：config/default.toml -> 可选的 config/local.toml -> WAGGLE__ 前缀环境变量
//! （如 WAGGLE__LLM__MODEL）。凭证类敏感值不走这里，单独从环境变量读取。

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::BotError;

#[derive(Clone, Debug, Deserialize)]
pub struct AppSection {
    /// 每个会话保留的历史条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 单条消息允许的最大模型调用轮数
    #[serde(default = "default_max_loop_turns")]
    pub max_loop_turns: u32,
    /// HTTP 监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 单次模型调用的 HTTP 超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AccountsSection {
    /// 未显式选择账户时使用的默认账户
    #[serde(default = "default_account")]
    pub default: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MediaSection {
    #[serde(default = "default_media_max_mb")]
    pub max_mb: f64,
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub accounts: AccountsSection,
    #[serde(default)]
    pub media: MediaSection,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_loop_turns: default_max_loop_turns(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_base: default_backoff_base(),
        }
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: default_tool_timeout_secs() }
    }
}

impl Default for AccountsSection {
    fn default() -> Self {
        Self { default: default_account() }
    }
}

impl Default for MediaSection {
    fn default() -> Self {
        Self { max_mb: default_media_max_mb(), timeout_secs: default_media_timeout_secs() }
    }
}

impl BotConfig {
    /// 从 config/ 目录与环境变量加载
    pub fn load() -> Result<Self, BotError> {
        Self::load_from("config")
    }

    pub fn load_from(dir: &str) -> Result<Self, BotError> {
        let settings = Config::builder()
            .add_source(File::with_name(&format!("{dir}/default")).required(false))
            .add_source(File::with_name(&format!("{dir}/local")).required(false))
            .add_source(Environment::with_prefix("WAGGLE").separator("__"))
            .build()
            .map_err(|e| BotError::generic(format!("failed to build config: {e}")))?;
        settings
            .try_deserialize()
            .map_err(|e| BotError::generic(format!("failed to parse config: {e}")))
    }
}

fn default_history_window() -> usize {
    10
}

fn default_max_loop_turns() -> u32 {
    5
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_account() -> String {
    "work".to_string()
}

fn default_media_max_mb() -> f64 {
    10.0
}

fn default_media_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let cfg = BotConfig {
            app: AppSection::default(),
            llm: LlmSection::default(),
            retry: RetrySection::default(),
            tools: ToolsSection::default(),
            accounts: AccountsSection::default(),
            media: MediaSection::default(),
        };
        assert_eq!(cfg.app.history_window, 10);
        assert_eq!(cfg.app.max_loop_turns, 5);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.initial_delay_ms, 1000);
        assert_eq!(cfg.retry.backoff_base, 2.0);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.accounts.default, "work");
        assert_eq!(cfg.media.max_mb, 10.0);
    }

    #[test]
    fn missing_config_dir_falls_back_to_defaults() {
        let cfg = BotConfig::load_from("no/such/dir").unwrap();
        assert_eq!(cfg.llm.model, "claude-3-haiku-20240307");
        assert_eq!(cfg.llm.max_tokens, 2048);
    }
}
