//! Announcements produced by the state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the static reply templates that carry a keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKey {
    PlayerNumSetting,
    Inviting,
    GetCardOrEnough,
    GetRules,
}

impl TemplateKey {
    pub const ALL: [TemplateKey; 4] = [
        TemplateKey::PlayerNumSetting,
        TemplateKey::Inviting,
        TemplateKey::GetCardOrEnough,
        TemplateKey::GetRules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::PlayerNumSetting => "PLAYER_NUM_SETTING",
            TemplateKey::Inviting => "INVITING",
            TemplateKey::GetCardOrEnough => "GET_CARD_OR_ENOUGH",
            TemplateKey::GetRules => "GET_RULES",
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message to deliver to the chat once the transaction commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Plain text
    Text(String),
    /// A stored reply template with its keyboard
    Prompt(TemplateKey),
}

impl Notice {
    pub fn text(text: impl Into<String>) -> Self {
        Notice::Text(text.into())
    }
}
