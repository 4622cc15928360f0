//! Runs one update to completion: route, transaction, state machine, delivery.

use std::sync::Arc;

use super::errors::{DispatchError, DispatchResult};
use super::router::{Command, Query, Route};
use super::sink::NotificationSink;
use super::templates::ReplyTemplates;
use super::update::Update;
use crate::db::{GameStore, StoreTx};
use crate::game::{BlackjackEngine, ChatId, GameError, GameResult, Notice};

/// Routes updates into the state machine and delivers its notices
pub struct Dispatcher<S: GameStore> {
    store: S,
    engine: BlackjackEngine,
    templates: ReplyTemplates,
    sink: Arc<dyn NotificationSink>,
}

impl<S: GameStore> Dispatcher<S> {
    pub fn new(
        store: S,
        engine: BlackjackEngine,
        templates: ReplyTemplates,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            engine,
            templates,
            sink,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &BlackjackEngine {
        &self.engine
    }

    /// Handle one update
    ///
    /// Precondition mismatches are dropped silently. Notices are sent only
    /// after the transaction has committed.
    pub async fn dispatch(&self, update: Update) -> DispatchResult<()> {
        let route = Route::parse(&update.kind)?;
        metrics::counter!("blackjack_updates_total", "route" => route.name()).increment(1);
        log::debug!(
            "Update {} for chat {}: {route}",
            update.update_id,
            update.chat_id
        );

        let notices = match self.run(route, &update).await {
            Ok(notices) => notices,
            Err(DispatchError::Game(GameError::InvalidTransition(reason))) => {
                log::debug!(
                    "Update {} for chat {} ignored: {reason}",
                    update.update_id,
                    update.chat_id
                );
                metrics::counter!("blackjack_updates_ignored_total", "route" => route.name())
                    .increment(1);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.deliver(update.chat_id, notices).await
    }

    async fn run(&self, route: Route, update: &Update) -> DispatchResult<Vec<Notice>> {
        if route == Route::Command(Command::Rules) {
            return Ok(self.engine.rules_summary());
        }

        let sender = match (&route, &update.sender) {
            (Route::Query(_), None) => return Err(DispatchError::MissingSender(update.update_id)),
            (_, sender) => sender.clone(),
        };

        let mut tx = self.store.begin().await?;
        let result = self.execute(&mut tx, route, update.chat_id, sender).await;

        match result {
            Ok(notices) => {
                tx.commit().await?;
                Ok(notices)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Rollback failed: {rollback_err}");
                }
                Err(err.into())
            }
        }
    }

    async fn execute(
        &self,
        tx: &mut S::Tx,
        route: Route,
        chat_id: ChatId,
        sender: Option<super::update::Sender>,
    ) -> GameResult<Vec<Notice>> {
        let engine = &self.engine;
        match route {
            Route::Command(command) => match command {
                Command::Start => engine.start(tx, chat_id).await,
                Command::Stop => engine.stop(tx, chat_id).await,
                Command::Continue => engine.resume(tx, chat_id).await,
                Command::Balances => engine.balances(tx, chat_id).await,
                Command::LastRound => engine.last_round(tx, chat_id).await,
                Command::Rules => Ok(engine.rules_summary()),
            },
            Route::Query(query) => {
                let Some(sender) = sender else {
                    return Err(GameError::InvalidTransition("callback without sender"));
                };
                match query {
                    Query::PlayersNum(count) => {
                        engine.set_participant_count(tx, chat_id, count).await
                    }
                    Query::Bet(amount) => {
                        engine
                            .place_bet(tx, chat_id, sender.id, &sender.username, amount)
                            .await
                    }
                    Query::GetCard => engine.draw(tx, chat_id, sender.id).await,
                    Query::Enough => engine.stand(tx, chat_id, sender.id).await,
                }
            }
        }
    }

    async fn deliver(&self, chat_id: ChatId, notices: Vec<Notice>) -> DispatchResult<()> {
        for notice in notices {
            match notice {
                Notice::Text(text) => self.sink.send(chat_id, &text, None).await?,
                Notice::Prompt(key) => {
                    let reply = self.templates.get(key)?;
                    self.sink
                        .send(chat_id, &reply.text, reply.markup.as_ref())
                        .await?;
                }
            }
        }
        Ok(())
    }
}
