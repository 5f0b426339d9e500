//! Google Calendar 工具
//!
//! 与 Todoist 不同，这里的凭证在每次执行时通过 AccountSelector 解析：
//! 同一个工具可以在 work / personal 账户之间切换，由 ToolContext 决定。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::accounts::{AccountSelector, CAP_GOOGLE};
use crate::error::BotError;
use crate::resilience::CircuitBreaker;
use crate::tools::registry::{Tool, ToolContext};

const CALENDAR_EVENTS_URL: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";

pub struct CalendarListEventsTool {
    client: reqwest::Client,
    selector: Arc<AccountSelector>,
    breaker: Arc<CircuitBreaker>,
}

impl CalendarListEventsTool {
    pub fn new(
        client: reqwest::Client,
        selector: Arc<AccountSelector>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self { client, selector, breaker }
    }

    async fn list_events(&self, token: &str, max_results: u64) -> Result<Value, BotError> {
        let resp = self
            .client
            .get(CALENDAR_EVENTS_URL)
            .bearer_auth(token)
            .query(&[
                ("timeMin", Utc::now().to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|e| BotError::api(format!("calendar request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Ok(json!({
                "success": false,
                "error": format!("google calendar returned status {status}"),
            }));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BotError::api(format!("calendar response was not json: {e}")))?;
        let events: Vec<Value> = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|ev| {
                        json!({
                            "summary": ev["summary"],
                            "start": ev["start"]["dateTime"].as_str()
                                .or(ev["start"]["date"].as_str()),
                            "end": ev["end"]["dateTime"].as_str()
                                .or(ev["end"]["date"].as_str()),
                            "location": ev["location"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "success": true, "count": events.len(), "events": events }))
    }
}

#[async_trait]
impl Tool for CalendarListEventsTool {
    fn name(&self) -> &str {
        "calendar_list_events"
    }

    fn description(&self) -> &str {
        "List upcoming events from the user's primary Google Calendar, starting from \
         now. Accepts an optional maximum number of events (default 10)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of events to return (default 10)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, BotError> {
        // 凭证解析失败（未知账户、无任何令牌）向上作为认证错误抛出
        let token = self.selector.resolve_token(CAP_GOOGLE, ctx.account.as_deref())?;
        let max_results = input["max_results"].as_u64().unwrap_or(10).min(50);
        self.breaker.execute(self.list_events(&token, max_results)).await
    }
}
