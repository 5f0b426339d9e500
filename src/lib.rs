//! Waggle：WhatsApp 个人助理机器人
//!
//! 入站消息经 Twilio webhook 进入，在有界的多轮工具调用循环里由模型驱动
//! Todoist / Google Calendar 等工具，外部依赖统一套熔断 + 指数退避重试，
//! 任何失败都收敛为一条用户可见的短文案。

pub mod accounts;
pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod integrations;
pub mod llm;
pub mod media;
pub mod observability;
pub mod resilience;
pub mod stats;
pub mod tools;

pub use agent::BotComponents;
pub use config::BotConfig;
pub use error::{BotError, ErrorKind};
