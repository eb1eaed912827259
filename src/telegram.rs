//! Telegram Bot API client: long polling plus the handful of send methods
//! the bot uses. Messages go out with HTML parse mode, matching the
//! formatting used throughout the handler texts.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::json::parse_json;

const API_BASE: &str = "https://api.telegram.org";

/// Long-poll duration requested from getUpdates.
pub const POLL_TIMEOUT_SECS: u64 = 30;

// -- Wire types --

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

// -- Keyboards --

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Inline(InlineKeyboardMarkup),
    Reply(ReplyKeyboardMarkup),
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

// -- Client --

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("{API_BASE}/bot{token}"),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    /// Parse the `{ok, result, description}` envelope, turning `ok=false`
    /// into an error carrying the API description.
    async fn read_envelope<T: DeserializeOwned>(
        &self,
        method: &str,
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        let text = resp.text().await?;
        let envelope: ApiResponse<T> = parse_json(&text)
            .with_context(|| format!("Telegram {method} returned unparseable body ({status})"))?;
        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| "no description".to_string());
            anyhow::bail!("Telegram {method} failed ({status}): {description}");
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("Telegram {method} returned ok without a result"))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let resp = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;
        self.read_envelope(method, resp).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn get_me(&self) -> Result<TgUser> {
        self.call("getMe", json!({})).await
    }

    /// Long-poll for updates. `offset = last update id + 1` acknowledges
    /// everything before it; `Some(-1)` discards the backlog.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        // The HTTP timeout has to outlast the long poll itself.
        let resp = self
            .http
            .post(self.method_url("getUpdates"))
            .json(&body)
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?;
        self.read_envelope("getUpdates", resp).await
    }

    #[tracing::instrument(skip_all, fields(chat_id = chat_id))]
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<Message> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(&markup)?;
        }
        self.call("sendMessage", body).await
    }

    #[tracing::instrument(skip_all, fields(chat_id = chat_id))]
    pub async fn send_sticker(&self, chat_id: i64, file_id: &str) -> Result<Message> {
        self.call(
            "sendSticker",
            json!({ "chat_id": chat_id, "sticker": file_id }),
        )
        .await
    }

    /// Upload a local file as a document.
    #[tracing::instrument(skip_all, fields(chat_id = chat_id))]
    pub async fn send_document(&self, chat_id: i64, path: &Path, caption: &str) -> Result<Message> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("report.zip")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        let resp = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        self.read_envelope("sendDocument", resp).await
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
            body["show_alert"] = json!(show_alert);
        }
        let _: bool = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_callback_query_deserializes() {
        let raw = r#"{
            "update_id": 7001,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42, "is_bot": false, "first_name": "Ivan", "username": "ivan"},
                "message": {"message_id": 9, "chat": {"id": 42}, "text": "💰 Ваш баланс"},
                "data": "buy_single"
            }
        }"#;
        let update: Update = parse_json(raw).expect("callback update");
        let callback = update.callback_query.expect("callback present");
        assert_eq!(callback.from.id, 42);
        assert_eq!(callback.data.as_deref(), Some("buy_single"));
        assert_eq!(callback.message.expect("message").chat.id, 42);
    }

    #[test]
    fn plain_message_update_tolerates_missing_fields() {
        let raw = r#"{
            "update_id": 7002,
            "message": {"message_id": 10, "chat": {"id": -100500}}
        }"#;
        let update: Update = parse_json(raw).expect("bare message");
        let message = update.message.expect("message present");
        assert!(message.text.is_none());
        assert!(message.from.is_none());
    }

    #[test]
    fn inline_keyboard_serializes_without_null_fields() {
        let markup = ReplyMarkup::Inline(InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton::callback("📄 1 отчет", "buy_single"),
                InlineKeyboardButton::link("💳 Оплатить", "https://pay.example/x"),
            ]],
        });
        let value = serde_json::to_value(&markup).expect("serialize");
        let row = &value["inline_keyboard"][0];
        assert_eq!(row[0]["callback_data"], "buy_single");
        assert!(row[0].get("url").is_none());
        assert_eq!(row[1]["url"], "https://pay.example/x");
        assert!(row[1].get("callback_data").is_none());
    }
}
