//! 进程级错误统计
//!
//! 所有会话共享同一份计数：总错误数、按类别计数、最近一条错误记录、熔断器开启次数。
//! 进程启动时清零，仅随终态错误与熔断开启而增长，进程重启前不重置。

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{BotError, ErrorKind};

/// 单条错误记录（含关联 ID，便于在日志中追踪同一次请求）
#[derive(Clone, Debug)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_errors: u64,
    count_by_kind: HashMap<ErrorKind, u64>,
    last_error: Option<ErrorRecord>,
    circuit_breaker_trips: u64,
}

/// 进程级错误统计（Mutex 保护，多任务并发写入）
#[derive(Debug, Default)]
pub struct ErrorStats {
    inner: Mutex<StatsInner>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条终态错误，返回分配的关联 ID
    pub fn record(&self, error: &BotError) -> Uuid {
        let correlation_id = Uuid::new_v4();
        let mut inner = self.inner.lock().expect("error stats lock poisoned");
        inner.total_errors += 1;
        *inner.count_by_kind.entry(error.kind).or_insert(0) += 1;
        inner.last_error = Some(ErrorRecord {
            kind: error.kind,
            message: error.message.clone(),
            timestamp: Utc::now(),
            correlation_id,
        });
        correlation_id
    }

    /// 熔断器 CLOSED/HALF_OPEN -> OPEN 时调用
    pub fn record_breaker_trip(&self) {
        let mut inner = self.inner.lock().expect("error stats lock poisoned");
        inner.circuit_breaker_trips += 1;
    }

    /// 健康检查用快照
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock().expect("error stats lock poisoned");
        let by_kind: HashMap<&'static str, u64> =
            inner.count_by_kind.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        json!({
            "total_errors": inner.total_errors,
            "count_by_kind": by_kind,
            "circuit_breaker_trips": inner.circuit_breaker_trips,
            "last_error": inner.last_error.as_ref().map(|r| json!({
                "kind": r.kind.as_str(),
                "message": r.message,
                "timestamp": r.timestamp.to_rfc3339(),
                "correlation_id": r.correlation_id.to_string(),
            })),
        })
    }
}
