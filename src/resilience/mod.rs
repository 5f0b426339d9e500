//! 弹性层：熔断器与指数退避重试

pub mod circuit;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::stats::ErrorStats;

/// 模型依赖的熔断器名
pub const BREAKER_CLAUDE: &str = "claude";
/// Todoist API 的熔断器名
pub const BREAKER_TODOIST: &str = "todoist";
/// Google API（日历等）的熔断器名
pub const BREAKER_GOOGLE: &str = "google_api";
/// Twilio（发消息、下载媒体）的熔断器名
pub const BREAKER_TWILIO: &str = "twilio";

/// 进程启动时按依赖名建好的一组熔断器，生命周期与进程相同
pub struct BreakerRegistry {
    breakers: HashMap<&'static str, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// 标准配置：模型与各服务 5 次失败 / 60s 冷却，媒体下载路径更敏感（3 / 30s）
    pub fn standard(stats: Arc<ErrorStats>) -> Self {
        let mut breakers: HashMap<&'static str, Arc<CircuitBreaker>> = HashMap::new();
        for (name, threshold, timeout_secs) in [
            (BREAKER_CLAUDE, 5, 60),
            (BREAKER_TODOIST, 5, 60),
            (BREAKER_GOOGLE, 5, 60),
            (BREAKER_TWILIO, 3, 30),
        ] {
            breakers.insert(
                name,
                Arc::new(
                    CircuitBreaker::new(name, threshold, Duration::from_secs(timeout_secs))
                        .with_stats(stats.clone()),
                ),
            );
        }
        Self { breakers }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown circuit breaker: {name}"))
    }

    /// 健康检查用快照：依赖名 -> {state, failure_count, trips}
    pub fn snapshot(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .breakers
            .iter()
            .map(|(name, b)| (name.to_string(), b.snapshot()))
            .collect();
        json!(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_all_dependencies() {
        let reg = BreakerRegistry::standard(Arc::new(ErrorStats::new()));
        for name in [BREAKER_CLAUDE, BREAKER_TODOIST, BREAKER_GOOGLE, BREAKER_TWILIO] {
            assert_eq!(reg.get(name).state(), CircuitState::Closed);
        }
        let snap = reg.snapshot();
        assert_eq!(snap["claude"]["state"], "closed");
    }
}
