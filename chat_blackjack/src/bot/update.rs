//! Inbound chat events, independent of the transport that delivered them.

use serde::{Deserialize, Serialize};

use crate::game::models::{ChatId, TgId};

/// Author of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: TgId,
    pub username: String,
}

/// Payload of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UpdateKind {
    /// Text message, possibly a command
    Message(String),
    /// Data attached to a pressed keyboard button
    Callback(String),
}

/// One event to dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub chat_id: ChatId,
    pub sender: Option<Sender>,
    pub kind: UpdateKind,
}

impl Update {
    pub fn message(update_id: i64, chat_id: ChatId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            update_id,
            chat_id,
            sender: Some(sender),
            kind: UpdateKind::Message(text.into()),
        }
    }

    pub fn callback(update_id: i64, chat_id: ChatId, sender: Sender, data: impl Into<String>) -> Self {
        Self {
            update_id,
            chat_id,
            sender: Some(sender),
            kind: UpdateKind::Callback(data.into()),
        }
    }
}
