//! 错误分类与用户可见文案
//!
//! 封闭的 ErrorKind 枚举 + BotError 结构体（内部诊断信息 + 可选预设用户文案）。
//! 是否可重试由 kind 决定，而不是由 catch 顺序决定；user_message 映射保证
//! 对任何错误都返回一条非技术性的短文案（与原 WhatsApp 机器人一致，含 emoji）。

use thiserror::Error;

/// 错误类别（封闭集合）：重试策略与用户文案都以它为键
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 外部 API 调用失败（网络、5xx 等）
    Api,
    /// 语音转写失败
    Transcription,
    /// 媒体（图片等）处理失败
    MediaProcessing,
    /// 认证 / 授权失败
    Authentication,
    /// 触发限流
    RateLimit,
    /// 操作超时
    Timeout,
    /// 熔断器处于 OPEN，调用被直接拒绝
    CircuitOpen,
    /// 模型请求了未注册的工具
    UnknownTool,
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Api => "api_error",
            ErrorKind::Transcription => "transcription_error",
            ErrorKind::MediaProcessing => "media_processing_error",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::CircuitOpen => "circuit_open_error",
            ErrorKind::UnknownTool => "unknown_tool_error",
            ErrorKind::Generic => "generic_error",
        }
    }

    /// 默认可重试集合：瞬态失败（超时、限流、一般 API 错误）。
    /// 认证失败、未知工具等终态错误必须立即向上传播；CircuitOpen 默认快速失败。
    pub fn retryable_by_default(&self) -> bool {
        matches!(self, ErrorKind::Api | ErrorKind::RateLimit | ErrorKind::Timeout)
    }
}

/// 机器人错误：kind + 内部诊断消息 + 可选预设用户文案
#[derive(Clone, Debug, Error)]
#[error("{}: {}", self.kind.as_str(), self.message)]
pub struct BotError {
    pub kind: ErrorKind,
    pub message: String,
    /// 预设的用户可见文案；user_message() 优先原样返回它
    pub user_message: Option<String>,
}

impl BotError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), user_message: None }
    }

    pub fn with_user_message(mut self, msg: impl Into<String>) -> Self {
        self.user_message = Some(msg.into());
        self
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn transcription(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transcription, message)
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MediaProcessing, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitOpen, message).with_user_message(
            "Service temporarily unavailable due to repeated errors. Please try again in a minute.",
        )
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: {name}"))
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }
}

/// 将任意错误转为用户可见的短文案（确定且全函数：永不返回空串）。
///
/// 优先级：预设文案原样返回 -> 诊断消息中的标记（"429"、"timeout" 等）->
/// kind 文案表 -> 带 context 的兜底文案。
pub fn user_message(error: &BotError, context: &str) -> String {
    if let Some(preset) = &error.user_message {
        if !preset.is_empty() {
            return preset.clone();
        }
    }

    let msg = error.message.to_lowercase();

    if msg.contains("rate limit") || msg.contains("429") {
        return "⏸️ Rate limit reached. Please wait a moment and try again.".to_string();
    }
    if msg.contains("timeout") || msg.contains("timed out") {
        return "⏱️ Request timed out. Please try again.".to_string();
    }
    if msg.contains("authentication") || msg.contains("unauthorized") || msg.contains("401") {
        return "🔐 Authentication error. Please try again or contact support.".to_string();
    }
    if msg.contains("not found") || msg.contains("404") {
        return "❓ Resource not found. Please check your request and try again.".to_string();
    }

    let mapped = match error.kind {
        ErrorKind::Timeout => Some("⏱️ The request took too long. Please try again."),
        ErrorKind::RateLimit => Some("⏸️ Too many requests. Please wait a minute and try again."),
        ErrorKind::Authentication => Some("🔐 Authentication failed. Please contact support."),
        ErrorKind::Transcription => {
            Some("🎤 Could not transcribe audio. Please try sending text instead.")
        }
        ErrorKind::MediaProcessing => {
            Some("🖼️ Could not process image. Try sending a smaller image.")
        }
        ErrorKind::Api => Some("🌐 External service error. Please try again in a moment."),
        ErrorKind::CircuitOpen => Some(
            "Service temporarily unavailable due to repeated errors. Please try again in a minute.",
        ),
        ErrorKind::UnknownTool | ErrorKind::Generic => None,
    };
    if let Some(m) = mapped {
        return m.to_string();
    }

    if !context.is_empty() {
        return format!(
            "❌ Error {context}. Please try again or contact support if the issue persists."
        );
    }
    "❌ Something went wrong. Please try again or contact support if the issue persists."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_user_message_is_returned_verbatim() {
        let err = BotError::api("todoist returned 500").with_user_message("custom text");
        assert_eq!(user_message(&err, "listing tasks"), "custom text");
    }

    #[test]
    fn marker_429_wins_regardless_of_kind() {
        let err = BotError::generic("upstream said 429 too many requests");
        assert!(user_message(&err, "").contains("Rate limit"));
    }

    #[test]
    fn marker_timeout_maps_to_timeout_text() {
        let err = BotError::api("connection timed out after 30s");
        assert!(user_message(&err, "").contains("timed out"));
    }

    #[test]
    fn kind_table_used_when_no_marker_matches() {
        let err = BotError::media("decode failure");
        assert!(user_message(&err, "").contains("image"));
    }

    #[test]
    fn context_appears_in_generic_fallback() {
        let err = BotError::generic("boom");
        let msg = user_message(&err, "processing your message");
        assert!(msg.contains("processing your message"));
    }

    #[test]
    fn always_non_empty_for_every_kind() {
        let kinds = [
            ErrorKind::Api,
            ErrorKind::Transcription,
            ErrorKind::MediaProcessing,
            ErrorKind::Authentication,
            ErrorKind::RateLimit,
            ErrorKind::Timeout,
            ErrorKind::CircuitOpen,
            ErrorKind::UnknownTool,
            ErrorKind::Generic,
        ];
        for kind in kinds {
            let err = BotError::new(kind, "x");
            assert!(!user_message(&err, "").is_empty());
        }
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        assert!(ErrorKind::Api.retryable_by_default());
        assert!(ErrorKind::RateLimit.retryable_by_default());
        assert!(ErrorKind::Timeout.retryable_by_default());
        assert!(!ErrorKind::Authentication.retryable_by_default());
        assert!(!ErrorKind::CircuitOpen.retryable_by_default());
        assert!(!ErrorKind::UnknownTool.retryable_by_default());
    }
}
