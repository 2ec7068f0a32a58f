use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatch::poll::AvailabilityPoll;
use crate::dispatch::response::BotResponse;
use crate::dispatch::transport::{Messenger, UpdateSource};
use crate::dispatch::update::BotUpdate;
use crate::error::{AppError, AppResult};

/// Seconds the provider may hold a `getUpdates` call open
const LONG_POLL_SECS: u64 = 20;

/// Every Bot API reply is wrapped in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self, method: &str) -> AppResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(AppError::Transport(format!(
                "{} rejected: {}",
                method,
                self.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PollOption<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SendPoll<'a> {
    chat_id: i64,
    question: &'a str,
    options: Vec<PollOption<'a>>,
    is_anonymous: bool,
}

impl<'a> SendPoll<'a> {
    fn new(chat_id: i64, poll: &'a AvailabilityPoll) -> Self {
        Self {
            chat_id,
            question: &poll.question,
            options: poll.options.iter().map(|text| PollOption { text }).collect(),
            is_anonymous: poll.is_anonymous,
        }
    }
}

/// Telegram Bot API client
pub struct TelegramClient {
    base_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    /// `request_timeout` bounds outbound sends; polls get the long-poll window on top
    pub fn new(api_url: &str, token: &str, request_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout + Duration::from_secs(LONG_POLL_SECS))
            .connect_timeout(request_timeout)
            .build()?;

        info!("✓ Telegram client ready");
        Ok(Self {
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            AppError::Transport(format!("{} returned {} with unreadable body: {}", method, status, e))
        })?;
        envelope.into_result(method)
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch_updates(&self, offset: i64) -> AppResult<Vec<BotUpdate>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message", "poll_answer"],
        });
        self.call("getUpdates", &body).await
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, response: &BotResponse) -> AppResult<()> {
        let body = SendMessage {
            chat_id: response.chat_id,
            text: &response.text,
            reply_to_message_id: response.reply_to,
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        debug!(chat_id = response.chat_id, "Message sent");
        Ok(())
    }

    async fn send_poll(&self, chat_id: i64, poll: &AvailabilityPoll) -> AppResult<()> {
        let _: serde_json::Value = self.call("sendPoll", &SendPoll::new(chat_id, poll)).await?;
        info!(chat_id, question = %poll.question, "📊 Availability poll sent");
        Ok(())
    }
}
