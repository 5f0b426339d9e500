//! 指数退避重试
//!
//! 显式高阶包装（retry 包住 breaker），组合顺序在调用点可见、可测。
//! 第 k 次重试（k 从 1 起）前的延迟为 initial_delay * backoff_base^(k-1)；
//! 仅 retryable 集合内的错误类别会重试，其余立即向上传播；最后一次失败的错误原样抛出。

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::error::{BotError, ErrorKind};
use crate::resilience::CircuitBreaker;

/// 重试策略：一个实例可被多个调用点共享（不含每次调用的状态）
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_base: f64,
    retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    /// retryable 默认取 ErrorKind::retryable_by_default（CircuitOpen 不在其中：熔断开启应快速失败）
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_base: f64) -> Self {
        let retryable = [ErrorKind::Api, ErrorKind::RateLimit, ErrorKind::Timeout]
            .into_iter()
            .collect();
        Self { max_retries, initial_delay, backoff_base, retryable }
    }

    /// 覆盖可重试类别集合
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// 执行 op，最多 max_retries + 1 次；breaker 存在时每次尝试都经过它。
    /// Breaker 拒绝产生的 CircuitOpen 错误同样按 retryable 集合判定（默认不重试）。
    pub async fn run<T, F, Fut>(
        &self,
        breaker: Option<&CircuitBreaker>,
        mut op: F,
    ) -> Result<T, BotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BotError>>,
    {
        let attempts = self.max_retries + 1;
        let mut last_error: Option<BotError> = None;

        for attempt in 0..attempts {
            let result = match breaker {
                Some(b) => b.execute(op()).await,
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.retryable.contains(&e.kind) {
                        return Err(e);
                    }
                    if attempt + 1 < attempts {
                        let delay =
                            self.initial_delay.mul_f64(self.backoff_base.powi(attempt as i32));
                        tracing::warn!(
                            attempt = attempt + 1,
                            total = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(total = attempts, error = %e, "all attempts failed");
                    }
                    last_error = Some(e);
                }
            }
        }

        // attempts >= 1，走到这里必然至少失败过一次
        Err(last_error.unwrap_or_else(|| BotError::generic("retry loop exhausted")))
    }
}
