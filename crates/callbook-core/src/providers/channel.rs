use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

/// Push channel accepting a message for one user.
pub trait NotificationChannel: Send + Sync {
    fn send<'a>(&'a self, user_id: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Writes messages to the log. Used when no messaging backend is configured.
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn send<'a>(&'a self, user_id: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("Notification to {}: {}", user_id, text);
            Ok(())
        })
    }
}

/// Telegram Bot API. User ids are Telegram chat ids.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> Self {
        Self::with_api_base(format!("https://api.telegram.org/bot{}", bot_token))
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }
}

impl NotificationChannel for TelegramChannel {
    fn send<'a>(&'a self, user_id: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(format!("{}/sendMessage", self.api_base))
                .json(&serde_json::json!({
                    "chat_id": user_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }))
                .send()
                .await?;

            let status = resp.status();
            let reply: TelegramReply = resp.json().await?;
            if !reply.ok {
                anyhow::bail!(
                    "telegram rejected message ({}): {}",
                    status,
                    reply.description.unwrap_or_default()
                );
            }
            Ok(())
        })
    }
}
