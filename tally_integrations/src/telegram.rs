//! Telegram Bot API client.
//!
//! Implements the core [`MessageSink`] over `sendMessage`,
//! `editMessageText`, and `deleteMessage` with a bot token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use tally_core::progress::{MessageRef, MessageSink};
use tally_core::{ChatId, Error, Result};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Clone)]
pub struct TelegramSink {
    client: Client,
    base_url: String,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Point at a self-hosted Bot API server (or a test double).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: format!("{}/bot{}", api_base.into().trim_end_matches('/'), token.into()),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .send()
            .await
            .map_err(|e| Error::backend("telegram", e))?;
        let body: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| Error::backend("telegram", e))?;

        if !body.ok {
            return Err(Error::BackendMessage(format!(
                "telegram {method} failed: {}",
                body.description.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        body.result.ok_or_else(|| {
            Error::BackendMessage(format!("telegram {method} returned no result"))
        })
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    #[instrument(level = "debug", skip(self, text))]
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &serde_json::json!({
                    "chat_id": chat.0,
                    "text": text,
                }),
            )
            .await?;
        Ok(MessageRef {
            chat,
            message_id: sent.message_id,
        })
    }

    #[instrument(level = "debug", skip(self, text))]
    async fn edit_text(&self, target: &MessageRef, text: &str) -> Result<()> {
        // The API returns the edited Message object; nothing in it is
        // needed here.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &serde_json::json!({
                    "chat_id": target.chat.0,
                    "message_id": target.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, target: &MessageRef) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &serde_json::json!({
                    "chat_id": target.chat.0,
                    "message_id": target.message_id,
                }),
            )
            .await?;
        Ok(())
    }
}
