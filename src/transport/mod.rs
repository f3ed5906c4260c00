pub mod telegram;

pub use telegram::TelegramClient;

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// A message already shown in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Rows of inline buttons.
pub type Menu = Vec<Vec<Button>>;

/// Something a user did in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat: ChatId,
    pub user: i64,
    pub username: Option<String>,
    /// The originating message, if any; used for cleanup.
    pub message: Option<MessageRef>,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Text(String),
    Command { name: String, args: String },
    Button { callback_id: String, payload: String },
    /// Photos, files, stickers and anything else that is not text.
    Other,
}

impl InboundKind {
    /// Classify a text message as a `/command` or plain text.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed.strip_prefix('/') {
            Some(rest) if !rest.is_empty() => {
                let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                // `/help@my_bot` in group chats
                let name = head.split('@').next().unwrap_or(head).to_lowercase();
                InboundKind::Command {
                    name,
                    args: args.trim().to_string(),
                }
            }
            _ => InboundKind::Text(trimmed.to_string()),
        }
    }
}

/// Outbound side of a chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef>;
    async fn send_menu(&self, chat: ChatId, text: &str, menu: &Menu) -> Result<MessageRef>;
    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()>;
    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<()>;
    async fn delete(&self, message: &MessageRef) -> Result<()>;
    /// Stop the client-side spinner on a pressed button.
    async fn answer_button(&self, callback_id: &str) -> Result<()>;
}

/// Attempt a side effect whose failure must not affect the caller.
///
/// The error is logged and dropped; `None` signals it happened.
pub async fn best_effort<T, F>(what: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{} failed (ignored): {}", what, e);
            None
        }
    }
}
