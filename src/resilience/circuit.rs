//! 熔断器
//!
//! 每个下游依赖（claude / todoist / google_api / twilio）一个实例，进程内全局共享：
//! 某个依赖持续失败时全进程快速失败，而不是每个会话各自重试。
//! OPEN -> HALF_OPEN 是惰性转换：在冷却期过后的第一次调用尝试时发生，没有后台定时器。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::BotError;
use crate::stats::ErrorStats;

/// 熔断器状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// 正常放行
    Closed,
    /// 拒绝调用，等待冷却
    Open,
    /// 冷却期已过，放行探测调用
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trips: u64,
}

/// 熔断器：状态加锁保护，锁从不跨 await 持有；同一实例被所有并发会话共享
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    open_timeout: Duration,
    stats: Option<Arc<ErrorStats>>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            open_timeout,
            stats: None,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trips: 0,
            }),
        }
    }

    /// 熔断开启时同步累计到进程级错误统计
    pub fn with_stats(mut self, stats: Arc<ErrorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// 通过熔断器执行一次调用。
    /// OPEN 且冷却期未过时不调用 op，直接返回 CircuitOpen 错误。
    pub async fn execute<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, BotError>>,
    ) -> Result<T, BotError> {
        self.before_call()?;
        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// 调用前检查：OPEN 状态下惰性判断是否进入 HALF_OPEN
    fn before_call(&self) -> Result<(), BotError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .last_failure_time
                .map(|t| t.elapsed() >= self.open_timeout)
                .unwrap_or(true);
            if cooled_down {
                tracing::info!(breaker = %self.name, "circuit breaker transitioning to HALF_OPEN");
                inner.state = CircuitState::HalfOpen;
            } else {
                return Err(BotError::circuit_open(format!(
                    "circuit breaker '{}' is OPEN - too many failures",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "circuit breaker recovered, transitioning to CLOSED");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        let should_open = match inner.state {
            // HALF_OPEN 下任何失败都重新开启
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            tracing::error!(
                breaker = %self.name,
                failures = inner.failure_count,
                "circuit breaker opening"
            );
            inner.state = CircuitState::Open;
            inner.trips += 1;
            if let Some(stats) = &self.stats {
                stats.record_breaker_trip();
            }
        }
    }

    /// 健康检查用快照
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        json!({
            "state": inner.state.as_str(),
            "failure_count": inner.failure_count,
            "trips": inner.trips,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new("test", threshold, timeout)
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), BotError> {
        b.execute(async { Err::<(), _>(BotError::api("boom")) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let b = breaker(3, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = fail(&b).await;
            assert_eq!(b.state(), CircuitState::Closed);
        }
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_operation() {
        let b = breaker(1, Duration::from_secs(60));
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = b
            .execute(async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BotError>(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::CircuitOpen);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes_and_resets() {
        let b = breaker(2, Duration::from_secs(30));
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        let result = b.execute(async { Ok::<_, BotError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(b.state(), CircuitState::Closed);

        // failure_count 已清零：需再次累计 threshold 次失败才会重新开启
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let b = breaker(1, Duration::from_secs(30));
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        // 冷却计时从最新一次失败重新计算
        tokio::time::advance(Duration::from_secs(15)).await;
        let r = b.execute(async { Ok::<_, BotError>(()) }).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn trips_are_reported_to_stats() {
        let stats = Arc::new(ErrorStats::new());
        let b = breaker(1, Duration::from_secs(60)).with_stats(stats.clone());
        let _ = fail(&b).await;
        assert_eq!(stats.snapshot()["circuit_breaker_trips"], 1);
    }
}
