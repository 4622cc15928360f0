//! Outbound messages.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

use super::templates::Markup;
use crate::game::models::ChatId;

/// Failure delivering a message
#[derive(Debug, Error)]
pub enum SinkError {
    /// The request never reached the chat API
    #[error("Transport error: {0}")]
    Transport(String),

    /// The chat API refused the message
    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Accepts "send this text to chat X" requests
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str, markup: Option<&Markup>)
    -> Result<(), SinkError>;
}

/// A message captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub markup: Option<Markup>,
}

/// Sink that records messages instead of sending them
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded message, oldest first
    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Texts sent to one chat, oldest first
    pub fn texts(&self, chat_id: ChatId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text)
            .collect()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), SinkError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentMessage {
                chat_id,
                text: text.to_string(),
                markup: markup.cloned(),
            });
        Ok(())
    }
}
