//! Structured logging configuration.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! also captures those records.

use chat_blackjack::Update;
use chat_blackjack::bot::UpdateKind;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var and default to
/// `info,sqlx=warn`.
///
/// # Example
///
/// ```no_run
/// use cb_bot::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Bot starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn,reqwest=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log an update accepted from the chat transport
pub fn log_update(update: &Update) {
    let (kind, payload) = match &update.kind {
        UpdateKind::Message(text) => ("message", text.as_str()),
        UpdateKind::Callback(data) => ("callback", data.as_str()),
    };

    tracing::debug!(
        update_id = update.update_id,
        chat_id = update.chat_id,
        sender = update.sender.as_ref().map(|s| s.id),
        kind = kind,
        "Update received: {}",
        payload
    );
}

/// Log an admin balance top-up
pub fn log_top_up(username: &str, amount: i64, balance: i64) {
    tracing::info!(
        username = username,
        amount = amount,
        balance = balance,
        "ADMIN: Balance topped up"
    );
}

/// Log a rejected admin request
pub fn log_admin_rejected(path: &str, reason: &str) {
    tracing::warn!(http_path = path, reason = reason, "ADMIN: Request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_blackjack::bot::Sender;

    #[test]
    fn test_log_update() {
        // Just ensure it doesn't panic
        let sender = Sender {
            id: 1,
            username: "alice".to_string(),
        };
        log_update(&Update::message(1, -100, sender.clone(), "/start"));
        log_update(&Update::callback(2, -100, sender, "bet/100"));
    }

    #[test]
    fn test_log_admin_events() {
        log_top_up("alice", 500, 10_500);
        log_admin_rejected("/api/v1/give_money", "missing token");
    }
}
