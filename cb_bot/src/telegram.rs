//! Telegram Bot API transport: long polling in, `sendMessage` out.

use async_trait::async_trait;
use chat_blackjack::bot::{Markup, NotificationSink, Sender, SinkError, Update, UpdateKind};
use chat_blackjack::game::ChatId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::TelegramConfig;
use crate::{logging, metrics};

/// Pause after a failed poll
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Transport errors
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API error: {0}")]
    Api(String),
}

impl From<TelegramError> for SinkError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Http(e) => SinkError::Transport(e.to_string()),
            TelegramError::Api(description) => SinkError::Rejected(description),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Raw update as delivered by `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct RawUpdate {
    pub update_id: i64,
    pub message: Option<RawMessage>,
    pub callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub chat: RawChat,
    pub from: Option<RawUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCallbackQuery {
    pub id: String,
    pub from: RawUser,
    pub message: Option<RawMessage>,
    pub data: Option<String>,
}

impl From<RawUser> for Sender {
    fn from(user: RawUser) -> Self {
        Sender {
            id: user.id,
            username: user.username.unwrap_or(user.first_name),
        }
    }
}

impl RawUpdate {
    /// Convert into a dispatchable update
    ///
    /// Returns `None` for updates the bot does not react to: messages
    /// without text and callbacks detached from a chat message.
    pub fn into_update(self) -> Option<Update> {
        if let Some(query) = self.callback_query {
            let chat_id = query.message?.chat.id;
            return Some(Update {
                update_id: self.update_id,
                chat_id,
                sender: Some(query.from.into()),
                kind: UpdateKind::Callback(query.data?),
            });
        }

        let message = self.message?;
        Some(Update {
            update_id: self.update_id,
            chat_id: message.chat.id,
            sender: message.from.map(Sender::from),
            kind: UpdateKind::Message(message.text?),
        })
    }
}

/// Bot API client
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client; requests time out a little after the long-poll window
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.token
            ),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api(
                response
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }

    /// Fetch updates with `update_id >= offset`, waiting up to `timeout_secs`
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<RawUpdate>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    /// Send a text message, optionally with an inline keyboard
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = markup {
            body["reply_markup"] = json!(markup);
        }

        self.call::<Value>("sendMessage", &body).await.map(|_| ())
    }

    /// Dismiss the loading indicator of a pressed button
    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.call::<Value>(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_id }),
        )
        .await
        .map(|_| ())
    }
}

/// Delivers notices through `sendMessage`
pub struct TelegramSink {
    client: TelegramClient,
}

impl TelegramSink {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), SinkError> {
        let result = self.client.send_message(chat_id, text, markup).await;
        metrics::messages_sent_total(result.is_ok());
        result.map_err(SinkError::from)
    }
}

/// Long-poll updates into `queue` until `shutdown` flips or the queue closes
///
/// The offset always advances past every fetched update, so an update that
/// fails to convert is never fetched again.
pub async fn poll_updates(
    client: TelegramClient,
    queue: mpsc::Sender<Update>,
    timeout_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0;
    log::info!("Polling for updates");

    loop {
        let polled = tokio::select! {
            _ = shutdown.changed() => break,
            polled = client.get_updates(offset, timeout_secs) => polled,
        };

        let updates = match polled {
            Ok(updates) => updates,
            Err(e) => {
                log::warn!("getUpdates failed: {e}");
                metrics::poll_failures_total();
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };

        metrics::updates_polled(updates.len());
        for raw in updates {
            offset = offset.max(raw.update_id + 1);

            if let Some(query) = &raw.callback_query {
                let client = client.clone();
                let callback_id = query.id.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.answer_callback(&callback_id).await {
                        log::debug!("answerCallbackQuery failed: {e}");
                    }
                });
            }

            let Some(update) = raw.into_update() else {
                continue;
            };
            logging::log_update(&update);
            if queue.send(update).await.is_err() {
                log::warn!("Update queue closed, stopping poller");
                return;
            }
        }
        metrics::queue_backlog(queue.max_capacity() - queue.capacity());
    }

    log::info!("Poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::post};
    use chat_blackjack::bot::Button;
    use std::sync::{Arc, Mutex};

    fn parse(raw: &str) -> RawUpdate {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_message_becomes_update() {
        let update = parse(
            r#"{"update_id": 7, "message": {"message_id": 1, "date": 0,
                "chat": {"id": -100, "type": "group"},
                "from": {"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"},
                "text": "/start@blackjack_bot"}}"#,
        )
        .into_update()
        .unwrap();

        assert_eq!(update.update_id, 7);
        assert_eq!(update.chat_id, -100);
        assert_eq!(update.sender.unwrap().username, "alice");
        assert_eq!(update.kind, UpdateKind::Message("/start@blackjack_bot".to_string()));
    }

    #[test]
    fn test_callback_uses_message_chat() {
        let update = parse(
            r#"{"update_id": 8, "callback_query": {"id": "cb1", "chat_instance": "x",
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "message": {"message_id": 2, "date": 0, "chat": {"id": -100, "type": "group"}},
                "data": "bet/100"}}"#,
        )
        .into_update()
        .unwrap();

        assert_eq!(update.chat_id, -100);
        assert_eq!(update.sender.unwrap().username, "Alice");
        assert_eq!(update.kind, UpdateKind::Callback("bet/100".to_string()));
    }

    #[test]
    fn test_updates_without_payload_are_skipped() {
        let sticker = parse(
            r#"{"update_id": 9, "message": {"message_id": 3, "date": 0,
                "chat": {"id": -100, "type": "group"},
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"}}}"#,
        );
        assert!(sticker.into_update().is_none());

        let edited = parse(r#"{"update_id": 10, "edited_message": {}}"#);
        assert!(edited.into_update().is_none());
    }

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn fake_api() -> (TelegramClient, Captured) {
        let captured: Captured = Arc::default();

        async fn send_message(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
            captured.lock().unwrap().push(body);
            Json(json!({"ok": true, "result": {"message_id": 1}}))
        }

        async fn get_updates() -> Json<Value> {
            Json(json!({"ok": true, "result": [
                {"update_id": 5, "message": {"message_id": 1, "date": 0,
                    "chat": {"id": -1, "type": "group"},
                    "from": {"id": 1, "is_bot": false, "first_name": "A"},
                    "text": "/start"}}
            ]}))
        }

        let app = Router::new()
            .route("/bottest-token/sendMessage", post(send_message))
            .route("/bottest-token/getUpdates", post(get_updates))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = TelegramClient::new(&TelegramConfig {
            token: "test-token".to_string(),
            api_url: format!("http://{addr}"),
            poll_timeout_secs: 0,
        })
        .unwrap();

        (client, captured)
    }

    #[tokio::test]
    async fn test_sink_posts_markup() {
        let (client, captured) = fake_api().await;
        let sink = TelegramSink::new(client);
        let markup = Markup {
            inline_keyboard: vec![vec![Button {
                text: "100".to_string(),
                callback_data: "bet/100".to_string(),
            }]],
        };

        sink.send(-100, "Place your bets!", Some(&markup)).await.unwrap();
        sink.send(-100, "plain", None).await.unwrap();

        let bodies = captured.lock().unwrap().clone();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["chat_id"], -100);
        assert_eq!(
            bodies[0]["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "bet/100"
        );
        assert!(bodies[1].get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn test_poller_forwards_updates() {
        let (client, _) = fake_api().await;
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let poller = tokio::spawn(poll_updates(client, tx, 0, stop_rx));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.chat_id, -1);
        assert_eq!(update.kind, UpdateKind::Message("/start".to_string()));

        stop_tx.send(true).unwrap();
        drop(rx);
        poller.await.unwrap();
    }
}
