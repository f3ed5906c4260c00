//! Minimal Telegram Bot API client: long polling plus the handful of
//! methods the bot needs.

use crate::error::{ClipbotError, Result};
use crate::transport::{ChatId, ChatTransport, Inbound, InboundKind, Menu, MessageRef};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// Telegram Bot API host.
const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Upload timeout for video files.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: TELEGRAM_API_URL.to_string(),
        }
    }

    /// Use a different API host (local Bot API server, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(method, e))?;
        Self::parse(method, response).await
    }

    async fn parse<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(method, e))?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            ClipbotError::Transport(format!("{method}: unexpected response ({status}): {e}"))
        })?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(ClipbotError::Transport(format!(
                "{method}: {}",
                parsed.description.unwrap_or_else(|| status.to_string())
            ))),
        }
    }

    /// Verify the token and return the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me: User = self.call("getMe", json!({})).await?;
        Ok(me.username.unwrap_or_default())
    }

    /// Long-poll for updates after `offset`. Returns the decoded events and the next offset.
    pub async fn poll(&self, offset: i64, timeout_secs: u64) -> Result<(Vec<Inbound>, i64)> {
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }))
            .send()
            .await
            .map_err(|e| request_error("getUpdates", e))?;
        let updates: Vec<Update> = Self::parse("getUpdates", response).await?;

        let next = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);
        let inbound = updates.into_iter().filter_map(Update::into_inbound).collect();
        Ok((inbound, next))
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        let message: Message = self
            .call("sendMessage", json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(message.to_ref())
    }

    async fn send_menu(&self, chat: ChatId, text: &str, menu: &Menu) -> Result<MessageRef> {
        let keyboard: Vec<Vec<Value>> = menu
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.payload }))
                    .collect()
            })
            .collect();

        let message: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat.0,
                    "text": text,
                    "reply_markup": { "inline_keyboard": keyboard },
                }),
            )
            .await?;
        Ok(message.to_ref())
    }

    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()> {
        let file = fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clip.mp4")
            .to_string();

        let part = Part::stream_with_length(Body::from(file), length)
            .file_name(file_name)
            .mime_str("video/mp4")?;
        let mut form = Form::new()
            .text("chat_id", chat.0.to_string())
            .part("video", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendVideo"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error("sendVideo", e))?;
        let _: Message = Self::parse("sendVideo", response).await?;
        debug!("Sent {} to chat {}", path.display(), chat.0);
        Ok(())
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<()> {
        // Returns the edited Message, or `true` for inline messages
        let _: Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": message.chat.0, "message_id": message.id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": message.chat.0, "message_id": message.id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_button(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }
}

/// Request URLs embed the bot token, so it is stripped before the error travels.
fn request_error(method: &str, error: reqwest::Error) -> ClipbotError {
    ClipbotError::Transport(format!("{method}: {}", error.without_url()))
}

// API types

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

impl Message {
    fn to_ref(&self) -> MessageRef {
        MessageRef {
            chat: ChatId(self.chat.id),
            id: self.message_id,
        }
    }
}

impl Update {
    fn into_inbound(self) -> Option<Inbound> {
        if let Some(query) = self.callback_query {
            let Some(message) = query.message else {
                warn!("Ignoring callback {} without a message", query.id);
                return None;
            };
            return Some(Inbound {
                chat: ChatId(message.chat.id),
                user: query.from.id,
                username: query.from.username,
                message: Some(message.to_ref()),
                kind: InboundKind::Button {
                    callback_id: query.id,
                    payload: query.data.unwrap_or_default(),
                },
            });
        }

        let message = self.message?;
        let from = message.from.as_ref();
        let kind = match message.text {
            Some(ref text) => InboundKind::from_text(text),
            None => InboundKind::Other,
        };
        Some(Inbound {
            chat: ChatId(message.chat.id),
            user: from.map_or(message.chat.id, |u| u.id),
            username: from.and_then(|u| u.username.clone()),
            message: Some(message.to_ref()),
            kind,
        })
    }
}
