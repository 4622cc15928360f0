//! # Chat Blackjack
//!
//! Multi-party Blackjack played inside group chats through a bot.
//!
//! Each chat owns one persistent game session. Chat members press keyboard
//! buttons or send commands; every such update is routed to the session
//! state machine, which runs inside a single store transaction holding the
//! chat's session row lock. Announcements are delivered once the
//! transaction has committed.
//!
//! ## Session lifecycle
//!
//! - **Sleeping**: no round running; `/start` opens one
//! - **WaitingForCount**: the chat picks how many players take part
//! - **WaitingForUsers**: players place bets; the last expected bet deals
//! - **Polling**: players take turns drawing cards or standing, then the
//!   dealer finishes and every hand is settled
//!
//! `/stop` pauses a running session and `/continue` resumes it.
//!
//! ## Core Modules
//!
//! - [`game`]: cards, rules, entities and the state machine
//! - [`db`]: session store traits with PostgreSQL and in-memory backends
//! - [`bot`]: routing, reply templates, delivery and the worker pool
//!
//! ## Example
//!
//! ```
//! use chat_blackjack::bot::{Dispatcher, MemorySink, ReplyTemplates, Sender, Update};
//! use chat_blackjack::db::MemoryStore;
//! use chat_blackjack::game::{BlackjackEngine, GameRules, RandomCards};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let dispatcher = Dispatcher::new(
//!     MemoryStore::default(),
//!     BlackjackEngine::new(GameRules::default(), Arc::new(RandomCards)),
//!     ReplyTemplates::bundled()?,
//!     sink.clone(),
//! );
//!
//! let alice = Sender { id: 1, username: "alice".into() };
//! dispatcher.dispatch(Update::message(1, -100, alice, "/start")).await?;
//! assert_eq!(sink.texts(-100), ["How many players are in?"]);
//! # Ok(())
//! # }
//! ```

/// Routing, reply templates, delivery and the worker pool.
pub mod bot;

/// Session store.
pub mod db;

/// Cards, rules, entities and the session state machine.
pub mod game;

pub use bot::{Dispatcher, NotificationSink, Update, WorkerPool};
pub use db::{GameStore, MemoryStore, PgGameStore, StoreTx};
pub use game::{BlackjackEngine, GameRules};
