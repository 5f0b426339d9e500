//! 进程入口：加载配置、组装组件、启动 HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use waggle::agent::BotComponents;
use waggle::config::BotConfig;
use waggle::integrations::sms::SmsInbox;
use waggle::integrations::whatsapp::{create_router, AppState, TwilioSender};
use waggle::media::{MediaFetcher, MediaPolicy};
use waggle::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().context("failed to initialize tracing")?;

    let config = BotConfig::load().context("failed to load configuration")?;
    tracing::info!(
        model = %config.llm.model,
        max_turns = config.app.max_loop_turns,
        history_window = config.app.history_window,
        "starting waggle"
    );

    let bot = Arc::new(BotComponents::create(&config).context("failed to build components")?);

    let twilio_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build twilio http client")?;
    let twilio = TwilioSender::from_env(twilio_http.clone());
    if twilio.is_none() {
        tracing::warn!("twilio credentials missing, /send endpoint disabled");
    }

    let media_policy = MediaPolicy::new(
        config.media.max_mb,
        Duration::from_secs(config.media.timeout_secs),
    );
    let media = match (
        std::env::var("TWILIO_ACCOUNT_SID"),
        std::env::var("TWILIO_AUTH_TOKEN"),
    ) {
        (Ok(sid), Ok(token)) => Some(
            MediaFetcher::new(twilio_http, media_policy).with_basic_auth(sid, token),
        ),
        _ => None,
    };

    let router = create_router(AppState {
        bot,
        twilio,
        media,
        sms: Arc::new(SmsInbox::default()),
    });
    let listener = tokio::net::TcpListener::bind(&config.app.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.app.listen_addr))?;
    tracing::info!(addr = %config.app.listen_addr, "listening");

    axum::serve(listener, router).await.context("server exited with error")?;
    Ok(())
}
