//! Todoist 任务管理工具
//!
//! 三个工具共享一个 TodoistApi（reqwest 客户端 + 令牌）。HTTP 层的失败同样收敛为
//! {"success": false, ...} 负载，由模型解释后转述给用户。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::BotError;
use crate::resilience::CircuitBreaker;
use crate::tools::registry::{Tool, ToolContext};

const TODOIST_TASKS_URL: &str = "https://api.todoist.com/rest/v2/tasks";

/// Todoist REST v2 的薄封装，所有请求过 todoist 熔断器
pub struct TodoistApi {
    client: reqwest::Client,
    token: String,
    breaker: Arc<CircuitBreaker>,
}

impl TodoistApi {
    pub fn new(client: reqwest::Client, token: String, breaker: Arc<CircuitBreaker>) -> Arc<Self> {
        Arc::new(Self { client, token, breaker })
    }

    async fn get_tasks(&self, filter: Option<&str>) -> Result<Value, BotError> {
        self.breaker.execute(self.get_tasks_inner(filter)).await
    }

    async fn get_tasks_inner(&self, filter: Option<&str>) -> Result<Value, BotError> {
        let mut req = self.client.get(TODOIST_TASKS_URL).bearer_auth(&self.token);
        if let Some(filter) = filter {
            req = req.query(&[("filter", filter)]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| BotError::api(format!("todoist request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Ok(json!({
                "success": false,
                "error": format!("todoist returned status {status}"),
            }));
        }

        let tasks: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| BotError::api(format!("todoist response was not json: {e}")))?;
        let tasks: Vec<Value> = tasks
            .iter()
            .map(|t| {
                json!({
                    "id": t["id"],
                    "content": t["content"],
                    "due": t["due"]["string"],
                    "priority": t["priority"],
                })
            })
            .collect();
        Ok(json!({ "success": true, "count": tasks.len(), "tasks": tasks }))
    }

    async fn create_task(
        &self,
        content: &str,
        due_string: Option<&str>,
        priority: Option<u64>,
    ) -> Result<Value, BotError> {
        self.breaker.execute(self.create_task_inner(content, due_string, priority)).await
    }

    async fn create_task_inner(
        &self,
        content: &str,
        due_string: Option<&str>,
        priority: Option<u64>,
    ) -> Result<Value, BotError> {
        let body = create_task_body(content, due_string, priority);
        let resp = self
            .client
            .post(TODOIST_TASKS_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::api(format!("todoist request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Ok(json!({
                "success": false,
                "error": format!("todoist returned status {status}"),
            }));
        }

        let task: Value = resp
            .json()
            .await
            .map_err(|e| BotError::api(format!("todoist response was not json: {e}")))?;
        Ok(json!({ "success": true, "id": task["id"], "content": task["content"] }))
    }

    async fn complete_task(&self, task_id: &str) -> Result<Value, BotError> {
        self.breaker.execute(self.complete_task_inner(task_id)).await
    }

    async fn complete_task_inner(&self, task_id: &str) -> Result<Value, BotError> {
        let resp = self
            .client
            .post(format!("{TODOIST_TASKS_URL}/{task_id}/close"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BotError::api(format!("todoist request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Ok(json!({
                "success": false,
                "error": format!("todoist returned status {status}"),
            }));
        }
        Ok(json!({ "success": true, "id": task_id }))
    }
}

/// Todoist 建任务请求体；priority 为 1（普通）到 4（最急）
fn create_task_body(content: &str, due_string: Option<&str>, priority: Option<u64>) -> Value {
    let mut body = json!({ "content": content });
    if let Some(due) = due_string {
        body["due_string"] = json!(due);
    }
    if let Some(priority) = priority {
        body["priority"] = json!(priority);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_task_body_forwards_all_fields() {
        let body = create_task_body("buy milk", Some("tomorrow 9am"), Some(4));
        assert_eq!(body["content"], "buy milk");
        assert_eq!(body["due_string"], "tomorrow 9am");
        assert_eq!(body["priority"], 4);
    }

    #[test]
    fn create_task_body_omits_absent_fields() {
        let body = create_task_body("buy milk", None, None);
        assert_eq!(body["content"], "buy milk");
        assert!(body.get("due_string").is_none());
        assert!(body.get("priority").is_none());
    }

    #[test]
    fn create_task_schema_advertises_priority() {
        let api = TodoistApi::new(
            reqwest::Client::new(),
            "tok".to_string(),
            std::sync::Arc::new(crate::resilience::CircuitBreaker::new(
                "todoist",
                5,
                std::time::Duration::from_secs(60),
            )),
        );
        let tool = TodoistCreateTaskTool::new(api);
        let schema = tool.input_schema();
        assert_eq!(schema["properties"]["priority"]["type"], "integer");
        assert_eq!(schema["required"], json!(["content"]));
    }
}

pub struct TodoistGetTasksTool {
    api: Arc<TodoistApi>,
}

impl TodoistGetTasksTool {
    pub fn new(api: Arc<TodoistApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for TodoistGetTasksTool {
    fn name(&self) -> &str {
        "todoist_get_tasks"
    }

    fn description(&self) -> &str {
        "List the user's open Todoist tasks; optionally narrow with a Todoist filter \
         expression such as 'today' or 'overdue'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "Optional Todoist filter expression, e.g. 'today'"
                }
            }
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, BotError> {
        self.api.get_tasks(input["filter"].as_str()).await
    }
}

pub struct TodoistCreateTaskTool {
    api: Arc<TodoistApi>,
}

impl TodoistCreateTaskTool {
    pub fn new(api: Arc<TodoistApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for TodoistCreateTaskTool {
    fn name(&self) -> &str {
        "todoist_create_task"
    }

    fn description(&self) -> &str {
        "Create a new Todoist task. Accepts the task text and an optional natural \
         language due date such as 'tomorrow at 9am'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Task text" },
                "due_string": {
                    "type": "string",
                    "description": "Optional natural language due date"
                },
                "priority": {
                    "type": "integer",
                    "description": "Optional priority from 1 (normal) to 4 (urgent)"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, BotError> {
        let content = input["content"]
            .as_str()
            .ok_or_else(|| BotError::generic("missing required field: content"))?;
        self.api
            .create_task(content, input["due_string"].as_str(), input["priority"].as_u64())
            .await
    }
}

pub struct TodoistCompleteTaskTool {
    api: Arc<TodoistApi>,
}

impl TodoistCompleteTaskTool {
    pub fn new(api: Arc<TodoistApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for TodoistCompleteTaskTool {
    fn name(&self) -> &str {
        "todoist_complete_task"
    }

    fn description(&self) -> &str {
        "Mark a Todoist task as completed by its task id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "Todoist task id" }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, BotError> {
        let task_id = input["task_id"]
            .as_str()
            .ok_or_else(|| BotError::generic("missing required field: task_id"))?;
        self.api.complete_task(task_id).await
    }
}
