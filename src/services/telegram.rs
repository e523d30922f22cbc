// src/services/telegram.rs
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::{BotError, Result};
use crate::models::{ChatId, Report};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const PARSE_MODE: &str = "MarkdownV2";

/// Delivers rendered reports and plain replies to chats.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send_report(&self, report: &Report) -> Result<()>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub migrate_to_chat_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: Option<String>,
}

fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let response: TelegramResponse<T> = serde_json::from_str(body)
        .map_err(|e| BotError::DeliveryFailure(format!("unexpected Telegram payload: {}", e)))?;
    if !response.ok {
        return Err(BotError::DeliveryFailure(
            response
                .description
                .unwrap_or_else(|| "Telegram rejected the request".into()),
        ));
    }
    response
        .result
        .ok_or_else(|| BotError::DeliveryFailure("Telegram response without result".into()))
}

/// Thin client for the Telegram Bot API.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_base_url(TELEGRAM_API_BASE, &config.bot_token)
    }

    pub fn with_base_url(api_base: &str, token: &str) -> Self {
        TelegramClient {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| BotError::DeliveryFailure(e.without_url().to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| BotError::DeliveryFailure(e.without_url().to_string()))?;
        decode_response(&body)
    }

    /// Long-polls for inbound updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut query = vec![("timeout", timeout_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let request = self.client.get(self.method_url("getUpdates")).query(&query);
        let updates: Vec<Update> = self.call(request).await?;
        debug!("Received {} updates", updates.len());
        Ok(updates)
    }
}

#[async_trait]
impl Dispatcher for TelegramClient {
    async fn send_report(&self, report: &Report) -> Result<()> {
        let photo = Part::bytes(report.image.clone())
            .file_name("ssb-chart.png")
            .mime_str("image/png")
            .map_err(|e| BotError::DeliveryFailure(e.to_string()))?;
        let form = Form::new()
            .text("chat_id", report.chat_id.to_string())
            .text("caption", report.caption.clone())
            .text("parse_mode", PARSE_MODE)
            .part("photo", photo);

        let request = self.client.post(self.method_url("sendPhoto")).multipart(form);
        self.call::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let request = self.client.post(self.method_url("sendMessage")).json(&serde_json::json!({
            "chat_id": chat_id.0,
            "text": text,
        }));
        self.call::<serde_json::Value>(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_send_is_delivery_failure() {
        let body = r#"{"ok": false, "error_code": 400,
            "description": "Bad Request: can't parse entities: Character '.' is reserved"}"#;
        let err = decode_response::<serde_json::Value>(body).unwrap_err();
        assert!(matches!(err, BotError::DeliveryFailure(msg) if msg.contains("reserved")));
    }

    #[test]
    fn decodes_updates() {
        let body = r#"{"ok": true, "result": [
            {"update_id": 10, "message": {"message_id": 1, "date": 0,
                "chat": {"id": -5, "type": "group"},
                "from": {"id": 3, "is_bot": false, "first_name": "A", "username": "alice"},
                "text": "/subscribe"}},
            {"update_id": 11}
        ]}"#;
        let updates: Vec<Update> = decode_response(body).unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, -5);
        assert_eq!(message.text.as_deref(), Some("/subscribe"));
        assert_eq!(
            message.from.as_ref().and_then(|u| u.username.as_deref()),
            Some("alice")
        );
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn token_is_part_of_method_url() {
        let client = TelegramClient::with_base_url("https://api.telegram.org/", "123:abc");
        assert_eq!(
            client.method_url("sendPhoto"),
            "https://api.telegram.org/bot123:abc/sendPhoto"
        );
    }
}
