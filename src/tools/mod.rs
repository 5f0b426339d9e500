//! 工具层：注册表、分发与各外部服务的具体工具

pub mod calendar;
pub mod registry;
pub mod todoist;

use std::sync::Arc;
use std::time::Duration;

use crate::accounts::{AccountSelector, CAP_GOOGLE, CAP_TODOIST};
use crate::resilience::{BreakerRegistry, BREAKER_GOOGLE, BREAKER_TODOIST};

pub use registry::{Tool, ToolContext, ToolRegistry, ToolSchema};

/// 按可解析的凭证构建注册表。缺凭证的服务直接不注册对应工具，
/// 模型侧自然就看不到它们，不需要运行期再判空。
pub fn build_registry(
    client: &reqwest::Client,
    selector: &Arc<AccountSelector>,
    breakers: &BreakerRegistry,
    call_timeout: Duration,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new(call_timeout);

    match selector.resolve_token(CAP_TODOIST, None) {
        Ok(token) => {
            let api =
                todoist::TodoistApi::new(client.clone(), token, breakers.get(BREAKER_TODOIST));
            registry.register(todoist::TodoistGetTasksTool::new(api.clone()));
            registry.register(todoist::TodoistCreateTaskTool::new(api.clone()));
            registry.register(todoist::TodoistCompleteTaskTool::new(api));
        }
        Err(_) => {
            tracing::info!("no Todoist credentials found, todoist tools disabled");
        }
    }

    if selector.has_any(CAP_GOOGLE) {
        registry.register(calendar::CalendarListEventsTool::new(
            client.clone(),
            selector.clone(),
            breakers.get(BREAKER_GOOGLE),
        ));
    } else {
        tracing::info!("no Google credentials found, calendar tools disabled");
    }

    registry
}
