//! Persistent game entities.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::cards::Hand;

/// Chat id of a group chat.
pub type ChatId = i64;

/// External user id of a chat member.
pub type TgId = i64;

/// Lifecycle of a chat's game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Sleeping,
    WaitingForCount,
    WaitingForUsers,
    Polling,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Sleeping => "sleeping",
            SessionStatus::WaitingForCount => "waiting_for_count",
            SessionStatus::WaitingForUsers => "waiting_for_users",
            SessionStatus::Polling => "polling",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sleeping" => Ok(SessionStatus::Sleeping),
            "waiting_for_count" => Ok(SessionStatus::WaitingForCount),
            "waiting_for_users" => Ok(SessionStatus::WaitingForUsers),
            "polling" => Ok(SessionStatus::Polling),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Turn state of a participant within the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Resting between rounds, or not betting in this one.
    Sleeping,
    /// Bet placed, waiting for a turn.
    Active,
    /// Currently taking a turn.
    Polling,
    /// Finished the round (stood, bust or hit 21).
    Assembled,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Sleeping => "sleeping",
            ParticipantStatus::Active => "active",
            ParticipantStatus::Polling => "polling",
            ParticipantStatus::Assembled => "assembled",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sleeping" => Ok(ParticipantStatus::Sleeping),
            "active" => Ok(ParticipantStatus::Active),
            "polling" => Ok(ParticipantStatus::Polling),
            "assembled" => Ok(ParticipantStatus::Assembled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status column held a value outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);

/// A chat member with a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub tg_id: TgId,
    pub username: String,
    pub balance: i64,
}

/// The Blackjack context of one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: i64,
    pub chat_id: ChatId,
    pub status: SessionStatus,
    pub expected_participant_count: Option<i32>,
    pub dealer_hand: Hand,
    pub stopped: bool,
}

/// A player's seat in a chat's session, reused across rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub session_id: i64,
    pub player: Player,
    pub status: ParticipantStatus,
    pub hand: Hand,
    pub bet: Option<i64>,
}

impl Participant {
    pub fn name(&self) -> &str {
        &self.player.username
    }

    /// Bet for the running round, zero when none was placed.
    pub fn stake(&self) -> i64 {
        self.bet.unwrap_or(0)
    }
}
