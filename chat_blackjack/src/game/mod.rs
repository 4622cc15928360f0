//! Blackjack game: cards, rules, persistent entities and the session state machine.

pub mod cards;
pub mod engine;
pub mod errors;
pub mod models;
pub mod notices;
pub mod rules;

pub use cards::{CardSource, Hand, RandomCards, ScriptedCards, SeededCards};
pub use engine::BlackjackEngine;
pub use errors::{GameError, GameResult};
pub use models::{ChatId, GameSession, Participant, ParticipantStatus, Player, SessionStatus, TgId};
pub use notices::{Notice, TemplateKey};
pub use rules::GameRules;
