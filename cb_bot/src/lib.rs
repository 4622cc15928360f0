//! Telegram front end for `chat_blackjack`: configuration, logging, the
//! long-poll transport and the admin HTTP API.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod telegram;
