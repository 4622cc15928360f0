//! Integration tests for the admin HTTP API against the in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use cb_bot::api::admin::{ErrorResponse, GiveMoneyResponse, RatingResponse};
use cb_bot::api::middleware::token_digest;
use cb_bot::api::{AppState, create_router};
use chat_blackjack::db::{GameStore, MemoryStore, StoreTx};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const TOKEN: &str = "test_admin_token";
const CHAT: i64 = -100;
const OTHER_CHAT: i64 = -200;

/// Store with three players: alice and bob in CHAT, carol in OTHER_CHAT
async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new(1_000);
    let mut tx = store.begin().await.unwrap();

    tx.get_or_create_session(CHAT).await.unwrap();
    tx.get_or_create_session(OTHER_CHAT).await.unwrap();
    tx.get_or_create_participant(1, CHAT, "alice").await.unwrap();
    let bob = tx.get_or_create_participant(2, CHAT, "bob").await.unwrap();
    let carol = tx
        .get_or_create_participant(3, OTHER_CHAT, "carol")
        .await
        .unwrap();
    tx.adjust_balance(bob.player.id, 500).await.unwrap();
    tx.adjust_balance(carol.player.id, 2_000).await.unwrap();

    tx.commit().await.unwrap();
    store
}

fn app_for(store: MemoryStore, digest: Option<String>) -> axum::Router {
    create_router(AppState::new(Arc::new(store), digest, 3))
}

async fn app() -> axum::Router {
    app_for(seeded_store().await, Some(token_digest(TOKEN)))
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn put_json(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_is_public() {
    let response = app().await.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], true);
    assert_eq!(body["workers"], 3);
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_missing_token_rejected() {
    let response = app()
        .await
        .oneshot(get("/api/v1/money_rating", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_token_rejected() {
    let response = app()
        .await
        .oneshot(get("/api/v1/money_rating", Some("guess")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_disabled_without_digest() {
    let app = app_for(seeded_store().await, None);
    let response = app
        .oneshot(get("/api/v1/money_rating", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Money Rating Tests
// ============================================================================

#[tokio::test]
async fn test_money_rating_all_players() {
    let response = app()
        .await
        .oneshot(get("/api/v1/money_rating", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rating: RatingResponse = body_json(response).await;
    let names: Vec<_> = rating.players.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, ["carol", "bob", "alice"]);
    assert_eq!(rating.players[0].balance, 3_000);
}

#[tokio::test]
async fn test_money_rating_filtered_by_chat_and_limited() {
    let response = app()
        .await
        .oneshot(get(
            &format!("/api/v1/money_rating?chat_id={CHAT}&limit=1"),
            Some(TOKEN),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rating: RatingResponse = body_json(response).await;
    assert_eq!(rating.players.len(), 1);
    assert_eq!(rating.players[0].username, "bob");
    assert_eq!(rating.players[0].balance, 1_500);
}

#[tokio::test]
async fn test_money_rating_accepts_num_players_alias() {
    let response = app()
        .await
        .oneshot(get("/api/v1/money_rating?num_players=2", Some(TOKEN)))
        .await
        .unwrap();

    let rating: RatingResponse = body_json(response).await;
    assert_eq!(rating.players.len(), 2);
}

#[tokio::test]
async fn test_money_rating_rejects_non_positive_limit() {
    let response = app()
        .await
        .oneshot(get("/api/v1/money_rating?limit=0", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Give Money Tests
// ============================================================================

#[tokio::test]
async fn test_give_money_credits_balance() {
    let store = seeded_store().await;
    let app = app_for(store.clone(), Some(token_digest(TOKEN)));

    let response = app
        .oneshot(put_json(
            "/api/v1/give_money",
            Some(TOKEN),
            r#"{"username": "alice", "amount": 250}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: GiveMoneyResponse = body_json(response).await;
    assert_eq!(body.username, "alice");
    assert_eq!(body.balance, 1_250);
    assert_eq!(store.player(1).unwrap().balance, 1_250);
}

#[tokio::test]
async fn test_give_money_unknown_player() {
    let response = app()
        .await
        .oneshot(put_json(
            "/api/v1/give_money",
            Some(TOKEN),
            r#"{"username": "mallory", "amount": 250}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: ErrorResponse = body_json(response).await;
    assert_eq!(body.error, "Player not found");
}

#[tokio::test]
async fn test_give_money_rejects_non_positive_amount() {
    let response = app()
        .await
        .oneshot(put_json(
            "/api/v1/give_money",
            Some(TOKEN),
            r#"{"username": "alice", "amount": -5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_give_money_requires_token() {
    let response = app()
        .await
        .oneshot(put_json(
            "/api/v1/give_money",
            None,
            r#"{"username": "alice", "amount": 250}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
