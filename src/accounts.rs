//! 凭证与账户选择
//!
//! 一个能力（capability，如 "google_api"）可以配置多套凭证（"work" / "personal"），
//! 另保留迁移前的单账户 legacy token。启动时从环境变量加载一次，此后只读。
//! 解析顺序：请求的账户 -> 配置的默认账户 -> legacy token -> AuthenticationError。

use std::collections::HashMap;

use crate::error::BotError;

/// Todoist 能力名
pub const CAP_TODOIST: &str = "todoist";
/// Google API（日历）能力名
pub const CAP_GOOGLE: &str = "google_api";

/// 凭证仓库：capability -> (account -> token)，外加 capability -> legacy token
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    accounts: HashMap<String, HashMap<String, String>>,
    legacy: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从环境变量加载：
    /// - TODOIST_API_TOKEN -> todoist 的 legacy token
    /// - GOOGLE_API_TOKEN_WORK / GOOGLE_API_TOKEN_PERSONAL -> google_api 的命名账户
    /// - GOOGLE_API_TOKEN -> google_api 的 legacy token
    pub fn from_env() -> Self {
        let mut store = Self::new();
        if let Ok(token) = std::env::var("TODOIST_API_TOKEN") {
            store.set_legacy(CAP_TODOIST, token);
        }
        for account in ["work", "personal"] {
            let var = format!("GOOGLE_API_TOKEN_{}", account.to_uppercase());
            if let Ok(token) = std::env::var(&var) {
                store.set_account(CAP_GOOGLE, account, token);
            }
        }
        if let Ok(token) = std::env::var("GOOGLE_API_TOKEN") {
            store.set_legacy(CAP_GOOGLE, token);
        }
        store
    }

    pub fn set_account(
        &mut self,
        capability: &str,
        account: &str,
        token: impl Into<String>,
    ) -> &mut Self {
        self.accounts
            .entry(capability.to_string())
            .or_default()
            .insert(account.to_string(), token.into());
        self
    }

    pub fn set_legacy(&mut self, capability: &str, token: impl Into<String>) -> &mut Self {
        self.legacy.insert(capability.to_string(), token.into());
        self
    }

    fn account_token(&self, capability: &str, account: &str) -> Option<&str> {
        self.accounts.get(capability).and_then(|m| m.get(account)).map(String::as_str)
    }

    fn legacy_token(&self, capability: &str) -> Option<&str> {
        self.legacy.get(capability).map(String::as_str)
    }

    /// 该能力是否有任何可用凭证（决定启动时是否注册对应工具）
    pub fn has_any(&self, capability: &str) -> bool {
        self.legacy.contains_key(capability)
            || self.accounts.get(capability).map(|m| !m.is_empty()).unwrap_or(false)
    }
}

/// 账户选择器：固定回退链，默认账户来自配置（而非硬编码）
#[derive(Clone, Debug)]
pub struct AccountSelector {
    store: CredentialStore,
    default_account: String,
}

impl AccountSelector {
    pub fn new(store: CredentialStore, default_account: impl Into<String>) -> Self {
        Self { store, default_account: default_account.into() }
    }

    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    pub fn has_any(&self, capability: &str) -> bool {
        self.store.has_any(capability)
    }

    /// 解析某能力应使用的 token。
    /// requested 为该会话显式选择的账户（上游命令设置），None 时直接走默认账户。
    pub fn resolve_token(
        &self,
        capability: &str,
        requested: Option<&str>,
    ) -> Result<String, BotError> {
        if let Some(account) = requested {
            if let Some(token) = self.store.account_token(capability, account) {
                return Ok(token.to_string());
            }
            tracing::warn!(
                capability,
                account,
                "requested account has no credentials, falling back"
            );
        }
        if let Some(token) = self.store.account_token(capability, &self.default_account) {
            return Ok(token.to_string());
        }
        if let Some(token) = self.store.legacy_token(capability) {
            return Ok(token.to_string());
        }
        Err(BotError::authentication(format!(
            "no credentials resolved for capability '{capability}' (requested: {:?}, default: {})",
            requested, self.default_account
        )))
    }
}
