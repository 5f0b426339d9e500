//! 日志初始化
//!
//! tracing-subscriber + EnvFilter，RUST_LOG 可覆盖默认级别。
//! 进程入口调用一次，重复调用报错。

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::BotError;

pub fn init_tracing() -> Result<(), BotError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,waggle=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| BotError::generic(format!("failed to init tracing: {e}")))
}
