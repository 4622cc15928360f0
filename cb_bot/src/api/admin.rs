//! Admin API handlers: balance rating and top-ups.
//!
//! Every endpoint here requires the admin token (see [`super::middleware`]).
//!
//! # Examples
//!
//! Top five balances of a chat:
//! ```bash
//! curl "http://localhost:8080/api/v1/money_rating?chat_id=-100123&limit=5" \
//!   -H "Authorization: Bearer TOKEN"
//! ```
//!
//! Top up a player:
//! ```bash
//! curl -X PUT http://localhost:8080/api/v1/give_money \
//!   -H "Authorization: Bearer TOKEN" \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "alice", "amount": 1000}'
//! ```

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chat_blackjack::db::{GameStore, StoreError};
use chat_blackjack::game::{ChatId, Player};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct RatingQuery {
    pub chat_id: Option<ChatId>,
    #[serde(alias = "num_players")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingEntry {
    pub username: String,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingResponse {
    pub players: Vec<RatingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GiveMoneyRequest {
    pub username: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GiveMoneyResponse {
    pub message: String,
    pub username: String,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn store_error(err: StoreError) -> ApiError {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(err, StoreError::InvalidAmount(_)) {
        StatusCode::BAD_REQUEST
    } else {
        log::error!("Admin request failed: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(ErrorResponse {
            error: err.client_message(),
        }),
    )
}

impl From<Player> for RatingEntry {
    fn from(player: Player) -> Self {
        Self {
            username: player.username,
            balance: player.balance,
        }
    }
}

/// Players ranked by balance, richest first.
///
/// # Query Parameters
///
/// - `chat_id`: only players who took part in this chat (optional)
/// - `limit` (alias `num_players`): maximum number of entries (optional)
///
/// # Response
///
/// Returns `200 OK`:
/// ```json
/// {"players": [{"username": "alice", "balance": 10500}]}
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: `limit` is not positive
/// - `401 Unauthorized`: Missing or invalid admin token
pub async fn money_rating<S: GameStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<RatingQuery>,
) -> Result<Json<RatingResponse>, ApiError> {
    if matches!(query.limit, Some(limit) if limit <= 0) {
        metrics::admin_requests_total("/money_rating", 400);
        return Err(bad_request("limit must be positive"));
    }

    let result = state.store.money_rating(query.chat_id, query.limit).await;
    match result {
        Ok(players) => {
            metrics::admin_requests_total("/money_rating", 200);
            Ok(Json(RatingResponse {
                players: players.into_iter().map(RatingEntry::from).collect(),
            }))
        }
        Err(e) => {
            let (status, body) = store_error(e);
            metrics::admin_requests_total("/money_rating", status.as_u16());
            Err((status, body))
        }
    }
}

/// Credit `amount` to the player named `username`.
///
/// # Request Body
///
/// ```json
/// {"username": "alice", "amount": 1000}
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: `amount` is not positive
/// - `401 Unauthorized`: Missing or invalid admin token
/// - `404 Not Found`: No player has that username
pub async fn give_money<S: GameStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<GiveMoneyRequest>,
) -> Result<Json<GiveMoneyResponse>, ApiError> {
    if request.amount <= 0 {
        metrics::admin_requests_total("/give_money", 400);
        return Err(bad_request("amount must be positive"));
    }

    match state
        .store
        .top_up_balance(&request.username, request.amount)
        .await
    {
        Ok(player) => {
            logging::log_top_up(&player.username, request.amount, player.balance);
            metrics::admin_requests_total("/give_money", 200);
            Ok(Json(GiveMoneyResponse {
                message: format!(
                    "Balance of {} topped up by {}",
                    player.username, request.amount
                ),
                username: player.username,
                balance: player.balance,
            }))
        }
        Err(e) => {
            let (status, body) = store_error(e);
            metrics::admin_requests_total("/give_money", status.as_u16());
            Err((status, body))
        }
    }
}
