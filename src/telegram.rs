//! Telegram Bot API adapter: long-polls `getUpdates` for commands and
//! implements [`ChatTransport`] on top of `sendMessage`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::engine::Monitor;
use crate::error::DeliveryError;
use crate::models::IncomingMessage;
use crate::notifier::ChatTransport;

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, String> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(self.description.unwrap_or_else(|| "no description".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    username: Option<String>,
}

impl Update {
    /// Only text messages are commands.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let message = self.message?;
        let text = message.text?;
        Some(IncomingMessage { chat_id: message.chat.id.to_string(), text })
    }
}

/// The token is part of every request URL, so request errors are stripped of
/// their URL before they are logged.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, base_url: format!("{}/bot{}", API_BASE, token) })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response: ApiResponse<T> = self.http
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{} request failed", method))?
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{} returned an unreadable body", method))?;
        response.into_result().map_err(|e| anyhow!("{} rejected: {}", method, e))
    }

    /// Fetches the bot's username, which also validates the token.
    pub async fn get_me(&self) -> Result<String> {
        let me: BotUser = self.call("getMe", serde_json::json!({})).await?;
        Ok(me.username.unwrap_or_default())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call("getUpdates", serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        }))
        .await
    }

    /// Receives commands until the task is cancelled.
    pub async fn run(&self, monitor: Arc<Monitor>) {
        info!("Listening for chat commands...");
        let mut offset = 0;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Polling failed: {:#}", e);
                    tokio::time::sleep(POLL_RETRY_PAUSE).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                match update.into_incoming() {
                    Some(message) => commands::dispatch(&monitor, message).await,
                    None => debug!("Skipping non-text update"),
                }
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response: ApiResponse<serde_json::Value> = self.http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        if !response.ok {
            let reason = response.description.unwrap_or_else(|| "no description".into());
            warn!(chat_id, "Telegram refused message: {}", reason);
            return Err(DeliveryError::Rejected(reason));
        }
        Ok(())
    }
}
