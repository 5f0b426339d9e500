//! WhatsApp（Twilio）HTTP 接入层
//!
//! webhook 收 Twilio 表单、回 TwiML；另暴露 /send（出站消息）、/health、
//! /conversations 三个运维接口。处理管线保证不抛错，webhook 对 Twilio
//! 永远回 200 + 合法 TwiML。

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::agent::BotComponents;
use crate::error::{user_message, BotError};
use crate::integrations::sms::SmsInbox;
use crate::media::MediaFetcher;
use crate::resilience::BREAKER_TWILIO;

/// Twilio 出站消息客户端（basic auth 的 REST 调用）
#[derive(Clone)]
pub struct TwilioSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSender {
    /// 需要 TWILIO_ACCOUNT_SID / TWILIO_AUTH_TOKEN / TWILIO_WHATSAPP_FROM；
    /// 缺任意一个则返回 None（只收不发的部署形态）
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").ok()?;
        let from = std::env::var("TWILIO_WHATSAPP_FROM").ok()?;
        Some(Self { client, account_sid, auth_token, from })
    }

    /// 成功时返回 Twilio 分配的 message sid
    pub async fn send(&self, to: &str, body: &str) -> Result<String, BotError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to = normalize_whatsapp_address(to);
        let params = [("To", to.as_str()), ("From", self.from.as_str()), ("Body", body)];

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BotError::timeout(format!("twilio send timed out: {e}"))
                } else {
                    BotError::api(format!("twilio send failed: {e}"))
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BotError::authentication("twilio rejected credentials"));
        }
        if !status.is_success() {
            return Err(BotError::api(format!("twilio returned status {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BotError::api(format!("twilio response was not json: {e}")))?;
        Ok(body["sid"].as_str().unwrap_or_default().to_string())
    }
}

/// Router 的共享状态
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<BotComponents>,
    pub twilio: Option<TwilioSender>,
    /// 入站媒体的限长校验下载器；None 时跳过校验只做标注
    pub media: Option<MediaFetcher>,
    /// SMS 验证码收件箱
    pub sms: Arc<SmsInbox>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .route("/webhook/sms", post(sms_webhook))
        .route("/sms/latest", get(sms_latest))
        .route("/send", post(send_message))
        .route("/health", get(health))
        .route("/conversations", get(conversations))
        .with_state(state)
}

/// Twilio 入站 webhook。字段数随媒体数量变化，按 map 解析
async fn whatsapp_webhook(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let from = form.get("From").cloned().unwrap_or_default();
    let body = form.get("Body").cloned().unwrap_or_default();
    let message_sid = form.get("MessageSid").cloned().unwrap_or_default();

    let num_media: usize =
        form.get("NumMedia").and_then(|n| n.parse().ok()).unwrap_or(0);
    let media_urls: Vec<String> = (0..num_media)
        .filter_map(|i| form.get(&format!("MediaUrl{i}")).cloned())
        .collect();

    tracing::info!(
        from = %from,
        sid = %message_sid,
        media = media_urls.len(),
        "inbound whatsapp message"
    );

    // 媒体先过大小 / 超时校验，失败时不进工具循环，直接回错误文案
    if let Some(fetcher) = &state.media {
        let breaker = state.bot.breakers.get(BREAKER_TWILIO);
        for url in &media_urls {
            if let Err(e) = breaker.execute(fetcher.fetch(url)).await {
                state.bot.stats.record(&e);
                tracing::warn!(url = %url, error = %e, "inbound media rejected");
                return twiml_reply(&user_message(&e, "processing your media"));
            }
        }
    }

    let reply = state.bot.handle_inbound_message(&from, &body, &media_urls).await;
    twiml_reply(&reply)
}

/// 入站 SMS（验证码接收用）：只入库，不回复
async fn sms_webhook(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let from = form.get("From").cloned().unwrap_or_default();
    let to = form.get("To").cloned().unwrap_or_default();
    let body = form.get("Body").cloned().unwrap_or_default();
    let sid = form.get("MessageSid").cloned().unwrap_or_default();

    tracing::info!(from = %from, sid = %sid, "inbound sms stored");
    state.sms.push(from, to, body, sid);

    Json(json!({ "status": "received" }))
}

/// 收件箱当前保留的全部短信（取验证码用）
async fn sms_latest(State(state): State<AppState>) -> Json<serde_json::Value> {
    let messages = state.sms.all();
    Json(json!({ "count": messages.len(), "messages": messages }))
}

#[derive(Deserialize)]
struct SendRequest {
    to: String,
    message: String,
}

/// 出站消息接口（测试 / 运维主动推送用），经 twilio 熔断器
async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Response {
    let Some(twilio) = &state.twilio else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "twilio sender is not configured" })),
        )
            .into_response();
    };

    let breaker = state.bot.breakers.get(BREAKER_TWILIO);
    match breaker.execute(twilio.send(&req.to, &req.message)).await {
        Ok(sid) => Json(json!({ "success": true, "message_sid": sid })).into_response(),
        Err(e) => {
            state.bot.stats.record(&e);
            tracing::error!(to = %req.to, error = %e, "outbound send failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.bot.health())
}

async fn conversations(State(state): State<AppState>) -> Json<serde_json::Value> {
    let summaries = state.bot.conversation_summaries().await;
    Json(json!({ "count": summaries.len(), "conversations": summaries }))
}

/// 包一层 TwiML，Content-Type 必须是 text/xml
fn twiml_reply(message: &str) -> Response {
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(message)
    );
    ([(header::CONTENT_TYPE, "text/xml")], xml).into_response()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn normalize_whatsapp_address(to: &str) -> String {
    if to.starts_with("whatsapp:") {
        to.to_string()
    } else {
        format!("whatsapp:{to}")
    }
}
